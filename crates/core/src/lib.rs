pub mod alert;
pub mod caller;
pub mod destination;
pub mod envelope;
pub mod error;
pub mod event;
pub mod integration;
pub mod log;
pub mod mapping;
pub mod route;
pub mod types;

pub use alert::{
    AlertChannel, AlertCondition, AlertHistory, AlertRule, AlertStatus, NotifyConfig,
};
pub use caller::Caller;
pub use destination::{
    AuthScheme, DEFAULT_TIMEOUT_MS, Destination, HttpMethod, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};
pub use envelope::{
    FIELD_LEADGEN, MetaChange, MetaEntry, MetaEnvelope, OBJECT_PAGE, OBJECT_WHATSAPP,
};
pub use error::HubError;
pub use event::{DEFAULT_MAX_ATTEMPTS, DeliveryAttempt, DeliveryEvent, EventStatus};
pub use integration::{Integration, MetaResource, MetaResourceKind};
pub use log::{LogCategory, LogEntry, LogLevel};
pub use mapping::{Condition, Mapping, MappingMode, MappingRule, Transform};
pub use route::{FilterRules, Route, WhatsappEventType};
pub use types::{
    AlertId, AlertRuleId, DestinationId, EventId, IntegrationId, MappingId, RouteId, SourceType,
    TenantId, UserId,
};
