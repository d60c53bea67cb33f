//! Registrar used when discovery is disabled.

use pen_core::ServiceDescriptor;
use tracing::debug;
use uuid::Uuid;

use crate::application::advertise::{DiscoveryRegistrar, RegistrarError};

/// Accepts every advertisement and publishes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

impl DiscoveryRegistrar for NoopRegistrar {
    fn advertise(&self, descriptor: &ServiceDescriptor) -> Result<(), RegistrarError> {
        debug!(
            "discovery disabled; not advertising \"{}\" on port {}",
            descriptor.name, descriptor.bound_port
        );
        Ok(())
    }

    fn withdraw(&self, _identifier: Uuid) -> Result<(), RegistrarError> {
        Ok(())
    }
}
