//! WASAPI implementation of [`VolumeBackend`].

use super::{percent_from_scalar, process_matches, scalar_from_percent, AudioError, VolumeBackend};
use windows::core::Interface;
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::ProcessStatus::GetModuleBaseNameW;
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

/// Keeps COM initialised on the current thread for as long as it lives.
pub struct ComGuard;

impl ComGuard {
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| AudioError::ComInit(e.to_string()))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Talks to the default render endpoint. Requires a live [`ComGuard`] on the
/// calling thread.
pub struct WasapiBackend {
    _com: ComGuard,
}

impl WasapiBackend {
    /// Initialises COM only. A missing output device shows up as an error on
    /// each call, so plugging one in later just works.
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self { _com: ComGuard::new()? })
    }

    unsafe fn default_device() -> Result<IMMDevice, AudioError> {
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| AudioError::Os(e.to_string()))?;
        enumerator
            .GetDefaultAudioEndpoint(eRender, eMultimedia)
            .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))
    }

    unsafe fn endpoint_volume() -> Result<IAudioEndpointVolume, AudioError> {
        let device = Self::default_device()?;
        device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| AudioError::VolumeNotAvailable(e.to_string()))
    }

    /// Every session on the default device with its lowercase process name.
    unsafe fn sessions() -> Result<Vec<(String, IAudioSessionControl)>, AudioError> {
        let device = Self::default_device()?;
        let manager: IAudioSessionManager2 = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| AudioError::Enumeration(e.to_string()))?;
        let sessions = manager
            .GetSessionEnumerator()
            .map_err(|e| AudioError::Enumeration(e.to_string()))?;
        let count = sessions.GetCount().map_err(|e| AudioError::Enumeration(e.to_string()))?;

        let mut found = Vec::new();
        for i in 0..count {
            let Ok(session) = sessions.GetSession(i) else { continue };
            let Ok(control) = Interface::cast::<IAudioSessionControl2>(&session) else { continue };
            let pid = match control.GetProcessId() {
                Ok(pid) if pid != 0 => pid,
                _ => continue,
            };
            let name = process_name(pid);
            if !name.is_empty() {
                found.push((name, session));
            }
        }
        Ok(found)
    }
}

fn process_name(pid: u32) -> String {
    unsafe {
        if let Ok(handle) = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) {
            let mut buffer = [0u16; 1024];
            let len = GetModuleBaseNameW(handle, None, &mut buffer);
            let _ = CloseHandle(handle);
            if len > 0 {
                return String::from_utf16_lossy(&buffer[..len as usize]).to_lowercase();
            }
        }
    }
    String::new()
}

impl VolumeBackend for WasapiBackend {
    fn master_volume(&self) -> Result<u8, AudioError> {
        unsafe {
            let volume = Self::endpoint_volume()?;
            let level = volume
                .GetMasterVolumeLevelScalar()
                .map_err(|e| AudioError::Os(e.to_string()))?;
            Ok(percent_from_scalar(level))
        }
    }

    fn set_master_volume(&self, percent: u8) -> Result<(), AudioError> {
        unsafe {
            let volume = Self::endpoint_volume()?;
            volume
                .SetMasterVolumeLevelScalar(scalar_from_percent(percent), std::ptr::null())
                .map_err(|e| AudioError::Os(e.to_string()))
        }
    }

    fn app_volume(&self, name: &str) -> Result<Option<u8>, AudioError> {
        unsafe {
            for (process, session) in Self::sessions()? {
                if !process_matches(&process, name) {
                    continue;
                }
                let volume = Interface::cast::<ISimpleAudioVolume>(&session)
                    .map_err(|e| AudioError::VolumeNotAvailable(e.to_string()))?;
                let level = volume.GetMasterVolume().map_err(|e| AudioError::Os(e.to_string()))?;
                return Ok(Some(percent_from_scalar(level)));
            }
        }
        Ok(None)
    }

    fn set_app_volume(&self, name: &str, percent: u8) -> Result<(), AudioError> {
        let mut matched = 0;
        unsafe {
            for (process, session) in Self::sessions()? {
                if !process_matches(&process, name) {
                    continue;
                }
                let volume = Interface::cast::<ISimpleAudioVolume>(&session)
                    .map_err(|e| AudioError::VolumeNotAvailable(e.to_string()))?;
                volume
                    .SetMasterVolume(scalar_from_percent(percent), std::ptr::null())
                    .map_err(|e| AudioError::Os(e.to_string()))?;
                matched += 1;
            }
        }
        if matched == 0 {
            tracing::debug!(app = name, "no running session to set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Runs both `IMMDevice::Activate` paths. A build host without speakers
    // may report a missing device but nothing else.
    #[test]
    fn test_endpoint_and_sessions_activate() {
        let backend = WasapiBackend::new().unwrap();
        match backend.master_volume() {
            Ok(percent) => assert!(percent <= 100),
            Err(e) => assert!(matches!(e, AudioError::NoDefaultDevice(_)), "{e}"),
        }
        match backend.app_volume("volknob-no-such-process") {
            Ok(volume) => assert_eq!(volume, None),
            Err(e) => assert!(matches!(e, AudioError::NoDefaultDevice(_)), "{e}"),
        }
    }
}
