//! Record shapes shared by every layer of the engine.

pub mod record;
pub mod value;

pub use record::{
    ConditionalRow, ConfigBatch, ConfigKind, ConfigRecord, ConfigServicePointer, Criterion,
    Operator, Origin,
};
pub use value::{
    ConfigValue, LimitDefinition, LimitPolicyName, LogLevel, SafetyLevel, StringList,
    WeightedValue, WeightedValues,
};
