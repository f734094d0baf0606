//! Native backend construction
//!
//! The worker calls [`init`] once at startup. On Windows it initializes COM
//! for the calling thread and builds the WASAPI and SMTC adapters; the
//! returned [`NativeBackends`] releases them and then uninitializes COM when
//! dropped. Other hosts have no backends and always report the capability as
//! unavailable.

use crate::audio::meter::AudioBackend;
use crate::error::{Error, Result};
use crate::media::session::MediaDirectory;

/// Native collaborators for one worker run
pub struct NativeBackends {
    pub audio: Box<dyn AudioBackend>,
    pub media: Box<dyn MediaDirectory>,
    // Declared last so it drops after the COM objects above
    #[cfg(windows)]
    _com: com::ComGuard,
}

#[cfg(windows)]
pub fn init() -> Result<NativeBackends> {
    use crate::audio::wasapi::WasapiBackend;
    use crate::media::smtc::SmtcDirectory;

    let com = com::ComGuard::new()?;
    let audio = WasapiBackend::new()
        .map_err(|e| Error::CapabilityUnavailable(format!("audio endpoint: {}", e)))?;
    let media = SmtcDirectory::new()
        .map_err(|e| Error::CapabilityUnavailable(format!("media session manager: {}", e)))?;

    tracing::info!("Native audio and media bindings ready");
    Ok(NativeBackends {
        audio: Box::new(audio),
        media: Box::new(media),
        _com: com,
    })
}

#[cfg(not(windows))]
pub fn init() -> Result<NativeBackends> {
    Err(Error::CapabilityUnavailable(format!(
        "audio session metering and media transport control need Windows, not {}",
        std::env::consts::OS
    )))
}

#[cfg(windows)]
mod com {
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

    use crate::error::Error;

    /// COM initialization for the current thread, undone on drop
    pub struct ComGuard;

    impl ComGuard {
        pub fn new() -> Result<Self, Error> {
            unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
                .map_err(|e| Error::CapabilityUnavailable(format!("COM initialization: {}", e)))?;
            Ok(Self)
        }
    }

    impl Drop for ComGuard {
        fn drop(&mut self) {
            unsafe { CoUninitialize() };
            tracing::debug!("COM released");
        }
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed the future never
/// resolves, so a missing signal handler cannot look like an interrupt.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
