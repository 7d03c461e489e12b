//! Signal dispatch to downstream consumers.
//!
//! Once the reconciler has resolved an in-order batch of resource references,
//! each one is handed to [`SignalDispatcher`], which looks up the destinations
//! bound to the subscription's topic in a [`DestinationRegistry`] and calls
//! them independently.

pub mod destination;
pub mod dispatcher;
pub mod registry;

pub use destination::{
    Destination, ProcessEngineDestination, TopicPublishDestination, destination_client,
};
pub use dispatcher::{DispatchReport, SignalDispatcher};
pub use registry::{Binding, DestinationConfig, DestinationRegistry, RegistryConfig, RegistryError};
