//! WASAPI peak metering
//!
//! Sessions and the endpoint meter are resolved against the *current*
//! default render device on every call, so switching outputs mid-run is
//! picked up on the next tick. COM must already be initialized on the calling
//! thread (see [`crate::platform`]).

use windows::core::{ComInterface, PWSTR};
use windows::Win32::Foundation::{CloseHandle, MAX_PATH};
use windows::Win32::Media::Audio::Endpoints::IAudioMeterInformation;
use windows::Win32::Media::Audio::{
    eConsole, eRender, IAudioSessionControl2, IAudioSessionManager2, IMMDevice,
    IMMDeviceEnumerator, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

use crate::audio::meter::{AudioBackend, AudioSessionEntry, PeakReadable};
use crate::error::AudioError;

impl From<windows::core::Error> for AudioError {
    fn from(e: windows::core::Error) -> Self {
        AudioError::Wasapi(e.to_string())
    }
}

/// Meter attached to one audio session
struct SessionMeter {
    meter: Option<IAudioMeterInformation>,
}

impl PeakReadable for SessionMeter {
    fn peak(&self) -> Result<f32, AudioError> {
        let meter = self
            .meter
            .as_ref()
            .ok_or_else(|| AudioError::PeakQuery("session exposes no meter".into()))?;
        unsafe { meter.GetPeakValue() }.map_err(|e| AudioError::PeakQuery(e.to_string()))
    }
}

/// [`AudioBackend`] over the default render endpoint
pub struct WasapiBackend {
    enumerator: IMMDeviceEnumerator,
}

impl WasapiBackend {
    /// Create the device enumerator. Fails when the audio service is missing.
    pub fn new() -> Result<Self, AudioError> {
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }?;
        Ok(Self { enumerator })
    }

    fn default_render_device(&self) -> Result<IMMDevice, AudioError> {
        unsafe { self.enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(|e| AudioError::Endpoint(e.to_string()))
    }
}

impl AudioBackend for WasapiBackend {
    fn sessions(&self) -> Result<Vec<AudioSessionEntry>, AudioError> {
        let device = self.default_render_device()?;

        unsafe {
            let manager: IAudioSessionManager2 = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| AudioError::Enumeration(e.to_string()))?;
            let sessions = manager
                .GetSessionEnumerator()
                .map_err(|e| AudioError::Enumeration(e.to_string()))?;
            let count = sessions
                .GetCount()
                .map_err(|e| AudioError::Enumeration(e.to_string()))?;

            let mut entries = Vec::with_capacity(count.max(0) as usize);
            for i in 0..count {
                let control = match sessions.GetSession(i) {
                    Ok(control) => control,
                    Err(e) => {
                        tracing::error!("Failed to open audio session {}: {}", i, e);
                        continue;
                    }
                };

                let process_name = control
                    .cast::<IAudioSessionControl2>()
                    .ok()
                    .and_then(|c| c.GetProcessId().ok())
                    .and_then(|pid| process_image_name(pid));

                let meter = control.cast::<IAudioMeterInformation>().ok();

                entries.push(AudioSessionEntry::new(
                    process_name,
                    Box::new(SessionMeter { meter }),
                ));
            }

            Ok(entries)
        }
    }

    fn endpoint_peak(&self) -> Result<f32, AudioError> {
        let device = self.default_render_device()?;
        unsafe {
            let meter: IAudioMeterInformation = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| AudioError::Endpoint(e.to_string()))?;
            meter
                .GetPeakValue()
                .map_err(|e| AudioError::Endpoint(e.to_string()))
        }
    }
}

/// File name of a process image, e.g. `spotify.exe`
fn process_image_name(pid: u32) -> Option<String> {
    // pid 0 is the system sounds session
    if pid == 0 {
        return None;
    }

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut buffer = [0u16; MAX_PATH as usize];
        let mut size = buffer.len() as u32;

        let result = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        );
        let _ = CloseHandle(handle);
        result.ok()?;

        let full_path = String::from_utf16_lossy(&buffer[..size as usize]);
        full_path
            .rsplit('\\')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}
