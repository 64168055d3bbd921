/// GfxContext - explicit owner of the process-wide graphics device
///
/// Created once at startup from a backend device and handed (by `Arc`) to
/// every component that records or creates GPU work. `shutdown()` drains the
/// queue and drops the device; after that `device()` fails with `InvalidState`.

use std::sync::{Arc, RwLock};
use crate::device::{GraphicsDevice, DeviceConfig};
use crate::error::{Error, Result};
use crate::{gfx_info, gfx_error, gfx_warn};

pub struct GfxContext {
    device: RwLock<Option<Arc<dyn GraphicsDevice>>>,
    /// Copy of the device's config, readable after shutdown
    config: DeviceConfig,
}

impl GfxContext {
    /// Log errors before returning them
    fn log_and_return_error(error: Error) -> Error {
        gfx_error!("crossgfx::GfxContext", "{}", error);
        error
    }

    /// Take ownership of a backend device
    ///
    /// # Example
    ///
    /// ```no_run
    /// use crossgfx::gfx::{GfxContext, DeviceConfig};
    /// use crossgfx::software::SoftwareDevice;
    ///
    /// let config = DeviceConfig::default();
    /// let context = GfxContext::new(SoftwareDevice::new(config)?);
    /// let device = context.device()?;
    /// let cmd = device.create_command_list()?;
    /// context.shutdown()?;
    /// # Ok::<(), crossgfx::gfx::Error>(())
    /// ```
    pub fn new<D: GraphicsDevice>(device: D) -> Arc<Self> {
        Self::from_shared(Arc::new(device))
    }

    /// Wrap an already shared device
    pub fn from_shared(device: Arc<dyn GraphicsDevice>) -> Arc<Self> {
        let config = device.config().clone();
        gfx_info!(
            "crossgfx::GfxContext",
            "Context created for '{}' on {:?} backend (usage tracking: {})",
            config.app_name,
            device.backend(),
            config.track_usage
        );
        Arc::new(Self {
            device: RwLock::new(Some(device)),
            config,
        })
    }

    /// The device, until shutdown
    pub fn device(&self) -> Result<Arc<dyn GraphicsDevice>> {
        let lock = self.device.read().map_err(|_| {
            Self::log_and_return_error(Error::BackendError("Device lock poisoned".to_string()))
        })?;
        lock.clone().ok_or_else(|| {
            Self::log_and_return_error(Error::InvalidState(
                "Context has been shut down".to_string(),
            ))
        })
    }

    /// The device's config, as it was when the context was created
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_alive(&self) -> bool {
        self.device.read().map(|lock| lock.is_some()).unwrap_or(false)
    }

    /// Drain the queue and release the device
    ///
    /// Resources still held by callers keep their backend objects alive; the
    /// device is destroyed once the last of them is dropped.
    pub fn shutdown(&self) -> Result<()> {
        let device = {
            let mut lock = self.device.write().map_err(|_| {
                Self::log_and_return_error(Error::BackendError("Device lock poisoned".to_string()))
            })?;
            lock.take()
        };

        match device {
            Some(device) => {
                device.wait_for_queue_idle()?;
                let outstanding = Arc::strong_count(&device) - 1;
                if outstanding > 0 {
                    gfx_warn!(
                        "crossgfx::GfxContext",
                        "Shutdown with {} outstanding device handle(s)",
                        outstanding
                    );
                }
                gfx_info!("crossgfx::GfxContext", "Context shut down");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for GfxContext {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.shutdown() {
                gfx_warn!("crossgfx::GfxContext", "Implicit shutdown failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
