//! Windows render backend over WASAPI.
//!
//! Resolution goes through IMMDeviceEnumerator (default communications
//! endpoint for the sentinel, an EnumAudioEndpoints scan for explicit ids).
//! Streams are shared-mode, event-driven IAudioClient instances with the
//! auto-convert flags set so the fixed engine format plays on any mix
//! format. The Win32 buffer-ready event is bridged onto the engine's ready
//! signal by a small waiter thread; COM notification callbacks
//! (IMMNotificationClient / IAudioSessionEvents) are bridged onto the sink
//! traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::{implement, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE};
use windows::Win32::Media::Audio::{
    eCommunications, eMultimedia, eRender, AudioSessionDisconnectReason, AudioSessionState,
    AudioSessionStateActive, EDataFlow, ERole, IAudioClient, IAudioRenderClient,
    IAudioSessionControl, IAudioSessionEvents, IAudioSessionEvents_Impl, IMMDevice,
    IMMDeviceEnumerator, IMMNotificationClient, IMMNotificationClient_Impl, MMDeviceEnumerator,
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_NOPERSIST,
    AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY, DEVICE_STATE, DEVICE_STATE_ACTIVE,
    DisconnectReasonDeviceRemoval, DisconnectReasonExclusiveModeOverride,
    DisconnectReasonFormatChanged, DisconnectReasonServerShutdown,
    DisconnectReasonSessionLogoff, WAVEFORMATEX,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CLSCTX_ALL, COINIT_MULTITHREADED,
};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject, INFINITE};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;

use super::{
    DataFlow, DeviceNotificationSink, DeviceRole, DisconnectReason, OutputDevice, OutputStream,
    ReadySignal, RenderBackend, SessionEventSink,
};
use crate::{DeviceId, RenderAudioError, StreamFormat};

/// WAVE_FORMAT_PCM constant (1)
const WAVE_FORMAT_PCM: u16 = 1;

thread_local! {
    // COM must be initialized once per thread that touches WASAPI; the
    // render loop thread is not under this module's control, so each entry
    // point ensures it lazily
    static COM_INIT: () = {
        let _ = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
    };
}

fn ensure_com() {
    COM_INIT.with(|_| {});
}

fn backend_err(e: windows::core::Error) -> RenderAudioError {
    RenderAudioError::BackendError(e.to_string())
}

fn buffer_err(e: windows::core::Error) -> RenderAudioError {
    RenderAudioError::BufferIo {
        reason: e.to_string(),
    }
}

/// Reads and frees a COM-allocated endpoint id string.
fn read_device_id(device: &IMMDevice) -> Result<String, RenderAudioError> {
    unsafe {
        let raw = device.GetId().map_err(backend_err)?;
        let id = raw.to_string().unwrap_or_default();
        CoTaskMemFree(Some(raw.0 as *const _));
        Ok(id)
    }
}

/// WASAPI render backend.
pub(super) struct WasapiBackend {
    enumerator: IMMDeviceEnumerator,
    registered: Mutex<Option<IMMNotificationClient>>,
}

impl WasapiBackend {
    pub(super) fn new() -> Result<Self, RenderAudioError> {
        ensure_com();
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .map_err(|e| RenderAudioError::BackendUnavailable {
                    reason: format!("failed to create device enumerator: {e}"),
                })?;
        Ok(Self {
            enumerator,
            registered: Mutex::new(None),
        })
    }
}

impl RenderBackend for WasapiBackend {
    fn resolve(&self, id: &DeviceId) -> Result<Box<dyn OutputDevice>, RenderAudioError> {
        ensure_com();

        if id.is_default() {
            let device = unsafe {
                self.enumerator
                    .GetDefaultAudioEndpoint(eRender, eCommunications)
            }
            .map_err(|_| RenderAudioError::NoDefaultDevice)?;
            return Ok(Box::new(WasapiDevice { device }));
        }

        let collection = unsafe {
            self.enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
        }
        .map_err(backend_err)?;
        let count = unsafe { collection.GetCount() }.map_err(backend_err)?;

        for i in 0..count {
            let device = unsafe { collection.Item(i) }.map_err(backend_err)?;
            if read_device_id(&device)? == id.as_str() {
                return Ok(Box::new(WasapiDevice { device }));
            }
        }

        Err(RenderAudioError::DeviceNotFound {
            id: id.as_str().to_string(),
        })
    }

    fn register_device_events(
        &self,
        sink: Arc<dyn DeviceNotificationSink>,
    ) -> Result<(), RenderAudioError> {
        let client: IMMNotificationClient = EndpointNotifier { sink }.into();
        unsafe {
            self.enumerator
                .RegisterEndpointNotificationCallback(&client)
        }
        .map_err(backend_err)?;
        *self.registered.lock() = Some(client);
        Ok(())
    }

    fn unregister_device_events(&self) -> Result<(), RenderAudioError> {
        if let Some(client) = self.registered.lock().take() {
            unsafe {
                self.enumerator
                    .UnregisterEndpointNotificationCallback(&client)
            }
            .map_err(backend_err)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "WasapiRender"
    }
}

#[derive(Debug)]
struct WasapiDevice {
    device: IMMDevice,
}

impl OutputDevice for WasapiDevice {
    fn id(&self) -> String {
        read_device_id(&self.device).unwrap_or_default()
    }

    fn open_output(
        &self,
        format: &StreamFormat,
        latency: Duration,
        ready: ReadySignal,
    ) -> Result<Box<dyn OutputStream>, RenderAudioError> {
        ensure_com();
        let device_id = self.id();
        let init_err = |e: windows::core::Error| RenderAudioError::InitializationFailed {
            device: device_id.clone(),
            reason: e.to_string(),
        };

        let client: IAudioClient =
            unsafe { self.device.Activate(CLSCTX_ALL, None) }.map_err(init_err)?;

        let wave_format = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_PCM,
            nChannels: format.channels,
            nSamplesPerSec: format.sample_rate,
            nAvgBytesPerSec: format.avg_bytes_per_sec() as u32,
            nBlockAlign: format.block_align() as u16,
            wBitsPerSample: format.bits_per_sample,
            cbSize: 0,
        };
        let latency_hns = (latency.as_nanos() / 100) as i64;

        unsafe {
            client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_EVENTCALLBACK
                    | AUDCLNT_STREAMFLAGS_NOPERSIST
                    | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                    | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                latency_hns,
                0,
                &wave_format,
                None,
            )
        }
        .map_err(init_err)?;

        let event = unsafe { CreateEventW(None, false, false, None) }.map_err(init_err)?;
        unsafe { client.SetEventHandle(event) }.map_err(init_err)?;

        let buffer_frames = unsafe { client.GetBufferSize() }.map_err(init_err)?;
        let render: IAudioRenderClient = unsafe { client.GetService() }.map_err(init_err)?;
        let session: IAudioSessionControl = unsafe { client.GetService() }.map_err(init_err)?;

        tracing::debug!(
            device = %device_id,
            buffer_frames,
            sample_rate = format.sample_rate,
            "opened shared-mode render stream"
        );

        // Bridge the Win32 buffer-ready event onto the engine's signal
        let waiter_stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let stop = waiter_stop.clone();
            let event = SendHandle(event);
            std::thread::Builder::new()
                .name("wasapi-ready".to_string())
                .spawn(move || {
                    let event = event;
                    loop {
                        unsafe { WaitForSingleObject(event.0, INFINITE) };
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        ready();
                    }
                })
                .map_err(|e| RenderAudioError::BackendError(e.to_string()))?
        };

        Ok(Box::new(WasapiOutputStream {
            client,
            render,
            session,
            session_events: None,
            event,
            waiter_stop,
            waiter: Some(waiter),
            buffer_frames,
            block_align: format.block_align(),
        }))
    }
}

/// HANDLE wrapper so the waiter thread can own the event.
struct SendHandle(HANDLE);
unsafe impl Send for SendHandle {}

struct WasapiOutputStream {
    client: IAudioClient,
    render: IAudioRenderClient,
    session: IAudioSessionControl,
    session_events: Option<IAudioSessionEvents>,
    event: HANDLE,
    waiter_stop: Arc<AtomicBool>,
    waiter: Option<JoinHandle<()>>,
    buffer_frames: u32,
    block_align: usize,
}

impl OutputStream for WasapiOutputStream {
    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn padding(&self) -> Result<u32, RenderAudioError> {
        unsafe { self.client.GetCurrentPadding() }.map_err(buffer_err)
    }

    fn write_frames(&mut self, data: &[u8]) -> Result<(), RenderAudioError> {
        let frames = (data.len() / self.block_align) as u32;
        if frames == 0 {
            return Ok(());
        }

        unsafe {
            let buffer = self.render.GetBuffer(frames).map_err(buffer_err)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
            // Zero flags: the buffer has content, even when that content is
            // silence
            self.render.ReleaseBuffer(frames, 0).map_err(buffer_err)?;
        }
        Ok(())
    }

    fn register_session_events(
        &mut self,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<(), RenderAudioError> {
        let events: IAudioSessionEvents = SessionNotifier { sink }.into();
        unsafe { self.session.RegisterAudioSessionNotification(&events) }
            .map_err(backend_err)?;
        self.session_events = Some(events);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RenderAudioError> {
        unsafe { self.client.Start() }.map_err(backend_err)
    }

    fn stop(&mut self) -> Result<(), RenderAudioError> {
        unsafe { self.client.Stop() }.map_err(backend_err)
    }
}

impl Drop for WasapiOutputStream {
    fn drop(&mut self) {
        unsafe {
            if let Some(events) = self.session_events.take() {
                let _ = self.session.UnregisterAudioSessionNotification(&events);
            }
            let _ = self.client.Stop();

            self.waiter_stop.store(true, Ordering::SeqCst);
            let _ = SetEvent(self.event);
            if let Some(waiter) = self.waiter.take() {
                let _ = waiter.join();
            }
            let _ = CloseHandle(self.event);
        }
    }
}

/// IMMNotificationClient bridge onto [`DeviceNotificationSink`].
#[implement(IMMNotificationClient)]
struct EndpointNotifier {
    sink: Arc<dyn DeviceNotificationSink>,
}

fn wide_to_string(s: &PCWSTR) -> String {
    unsafe { s.to_string().unwrap_or_default() }
}

fn map_flow(flow: EDataFlow) -> DataFlow {
    if flow == eRender {
        DataFlow::Render
    } else {
        DataFlow::Capture
    }
}

fn map_role(role: ERole) -> DeviceRole {
    if role == eCommunications {
        DeviceRole::Communications
    } else if role == eMultimedia {
        DeviceRole::Multimedia
    } else {
        DeviceRole::Console
    }
}

impl IMMNotificationClient_Impl for EndpointNotifier {
    fn OnDeviceStateChanged(
        &self,
        device_id: &PCWSTR,
        new_state: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        self.sink
            .on_device_state_changed(&wide_to_string(device_id), new_state == DEVICE_STATE_ACTIVE);
        Ok(())
    }

    fn OnDeviceAdded(&self, device_id: &PCWSTR) -> windows::core::Result<()> {
        self.sink.on_device_added(&wide_to_string(device_id));
        Ok(())
    }

    fn OnDeviceRemoved(&self, device_id: &PCWSTR) -> windows::core::Result<()> {
        self.sink.on_device_removed(&wide_to_string(device_id));
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        default_device_id: &PCWSTR,
    ) -> windows::core::Result<()> {
        self.sink.on_default_device_changed(
            map_flow(flow),
            map_role(role),
            &wide_to_string(default_device_id),
        );
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _device_id: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

/// IAudioSessionEvents bridge onto [`SessionEventSink`].
#[implement(IAudioSessionEvents)]
struct SessionNotifier {
    sink: Arc<dyn SessionEventSink>,
}

fn map_disconnect_reason(reason: AudioSessionDisconnectReason) -> DisconnectReason {
    if reason == DisconnectReasonDeviceRemoval {
        DisconnectReason::DeviceRemoved
    } else if reason == DisconnectReasonServerShutdown {
        DisconnectReason::ServerShutdown
    } else if reason == DisconnectReasonFormatChanged {
        DisconnectReason::FormatChanged
    } else if reason == DisconnectReasonSessionLogoff {
        DisconnectReason::SessionLoggedOff
    } else if reason == DisconnectReasonExclusiveModeOverride {
        DisconnectReason::ExclusiveModeOverride
    } else {
        DisconnectReason::SessionReplaced
    }
}

impl IAudioSessionEvents_Impl for SessionNotifier {
    fn OnDisplayNameChanged(
        &self,
        _new_display_name: &PCWSTR,
        _event_context: *const windows::core::GUID,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnIconPathChanged(
        &self,
        _new_icon_path: &PCWSTR,
        _event_context: *const windows::core::GUID,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnSimpleVolumeChanged(
        &self,
        _new_volume: f32,
        _new_mute: BOOL,
        _event_context: *const windows::core::GUID,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnChannelVolumeChanged(
        &self,
        _channel_count: u32,
        _new_channel_volumes: *const f32,
        _changed_channel: u32,
        _event_context: *const windows::core::GUID,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnGroupingParamChanged(
        &self,
        _new_grouping_param: *const windows::core::GUID,
        _event_context: *const windows::core::GUID,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnStateChanged(&self, new_state: AudioSessionState) -> windows::core::Result<()> {
        self.sink
            .on_session_state_changed(new_state == AudioSessionStateActive);
        Ok(())
    }

    fn OnSessionDisconnected(
        &self,
        disconnect_reason: AudioSessionDisconnectReason,
    ) -> windows::core::Result<()> {
        self.sink
            .on_session_disconnected(map_disconnect_reason(disconnect_reason));
        Ok(())
    }
}
