//! Resource-type business logic for the emulator: typed attribute views over
//! the schema-less store, instance/volume/launch-template/spot/Auto Scaling
//! lifecycles, filtering glue, and the timer wheel used to schedule reclaims
//! and reaps. Locking, test-profile delay injection, and wiring requests to
//! these functions is the dispatcher's job (`spec.md` §4.8); everything here
//! is a plain, synchronous-where-possible state transition over the store.

pub mod attrs;
pub mod autoscaling;
pub mod dispatcher;
pub mod error;
pub mod filters;
pub mod instances;
pub mod launch_templates;
pub mod spot;
pub mod tags;
pub mod time;
pub mod timers;
pub mod volumes;

pub use error::{EngineError, EngineResult};
