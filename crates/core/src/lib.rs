pub mod config;
pub mod dispatcher;
pub mod events;
pub mod metrics;
pub mod notifier;
pub mod service;
pub mod testing;
pub mod ticket;

pub use config::{
    config_path, load_config, load_config_from_str, validate_config, Config, ConfigError,
    SanitizedConfig,
};
pub use dispatcher::{
    DispatcherConfig, DispatcherError, DispatcherState, DispatcherStats, DispatcherStatus,
    DispatcherSupervisor, QueueDispatcher,
};
pub use events::{
    create_publish_system, Broadcaster, DeliveryGap, EventLog, EventPublisher, LogWriter,
    LoggedEvent, PublisherConfig, QueueEvent, SqliteEventLog, StreamKeys, Subscription,
    TopicBroadcaster,
};
pub use notifier::{relay, NotifierError, NotifierSession, RelayEnd, RelayOutcome};
pub use service::{CreateOutcome, QueueService};
pub use ticket::{
    ArchiveOutcome, NewTicket, QueueStats, Reservation, SqliteTicketStore, StatusUpdate, Ticket,
    TicketError, TicketStatus, TicketStore,
};
