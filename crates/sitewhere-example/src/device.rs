//! The demo device: registration, test events, location reports and a
//! synthetic audio stream.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use sitewhere_client::{
    ClientHandler, ClientResult, DeviceMessaging, DispatchError, MainThread, SiteWhereClient,
    Transport,
};
use sitewhere_protocol::{
    DeviceStreamAck, DeviceStreamAckState, DeviceStreamData, Header, RegistrationAck,
    RegistrationAckState,
};

use crate::backend::HostBackend;

/// The client as the example host owns it.
pub type Client = SiteWhereClient<HostBackend, Device>;

/// Content type announced for the audio stream.
pub const STREAM_CONTENT_TYPE: &str = "audio/x-ac3";

const SAMPLE_RATE: u32 = 8_000;
const TONE_HZ: f64 = 440.0;
const AMPLITUDE: f64 = 8_000.0;
/// 20 ms of audio per chunk.
const CHUNK_SAMPLES: usize = 160;
const CHUNK_INTERVAL: Duration = Duration::from_millis(20);

/// Where the test events say the device is.
const HOME: (f64, f64) = (33.7550, -84.3900);

/// Registration details and behavior knobs.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub hardware_id: String,
    pub specification_token: String,
    pub site_token: Option<String>,
    /// How long to stream audio once a stream is acknowledged.
    pub stream_duration: Duration,
}

/// Host state driven by client callbacks and main-thread tasks.
pub struct Device {
    profile: DeviceProfile,
    main: MainThread<Client>,
    background: String,
    registered: bool,
    pending_stream: Option<String>,
    location_step: u32,
}

impl Device {
    pub fn new(profile: DeviceProfile, main: MainThread<Client>) -> Self {
        Self {
            profile,
            main,
            background: "#ffffff".to_string(),
            registered: false,
            pending_stream: None,
            location_step: 0,
        }
    }

    pub fn hardware_id(&self) -> &str {
        &self.profile.hardware_id
    }

    /// True once the platform accepted the registration.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    pub fn set_background(&mut self, color: impl Into<String>) {
        self.background = color.into();
        info!(color = %self.background, "background changed");
    }

    /// Stream id awaiting its acknowledgement.
    pub fn pending_stream(&self) -> Option<&str> {
        self.pending_stream.as_deref()
    }

    /// Sends one measurement, one location and one alert.
    pub fn send_test_events(
        &self,
        transport: &mut dyn Transport,
        originator: Option<&str>,
    ) -> ClientResult<()> {
        let hardware_id = self.hardware_id();
        transport.send_measurement(hardware_id, originator, "engine.temp", 170.0)?;
        transport.send_location(hardware_id, originator, HOME.0, HOME.1, Some(0.0))?;
        transport.send_alert(
            hardware_id,
            originator,
            "engine.overheat",
            "Engine is overheating!",
        )?;
        debug!(originator = originator.unwrap_or_default(), "sent test events");
        Ok(())
    }

    /// Sends the next position of a small loop around the home location.
    pub fn report_location(&mut self, transport: &mut dyn Transport) -> ClientResult<()> {
        let angle = f64::from(self.location_step % 360).to_radians();
        self.location_step = self.location_step.wrapping_add(15);
        let latitude = HOME.0 + 0.001 * angle.sin();
        let longitude = HOME.1 + 0.001 * angle.cos();
        transport.send_location(self.hardware_id(), None, latitude, longitude, None)
    }

    fn create_stream(&mut self, transport: &mut dyn Transport) {
        let stream_id = uuid::Uuid::new_v4().to_string();
        match transport.create_device_stream(
            self.hardware_id(),
            None,
            &stream_id,
            STREAM_CONTENT_TYPE,
        ) {
            Ok(()) => {
                debug!(stream_id = %stream_id, "requested stream");
                self.pending_stream = Some(stream_id);
            }
            Err(e) => warn!(error = %e, "unable to request stream"),
        }
    }

    fn start_streaming(&self, stream_id: String) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(stream_id = %stream_id, "no runtime for audio capture");
            return;
        };
        info!(
            stream_id = %stream_id,
            secs = self.profile.stream_duration.as_secs(),
            "starting stream"
        );
        let main = self.main.clone();
        let hardware_id = self.profile.hardware_id.clone();
        let duration = self.profile.stream_duration;
        runtime.spawn_blocking(move || capture(main, hardware_id, stream_id, duration));
    }
}

impl ClientHandler for Device {
    fn on_connected(&mut self, transport: &mut dyn Transport) {
        info!(hardware_id = %self.profile.hardware_id, "connected, registering");
        if let Err(e) = transport.register_device(
            &self.profile.hardware_id,
            &self.profile.specification_token,
            self.profile.site_token.as_deref(),
            None,
        ) {
            warn!(error = %e, "unable to send registration");
        }
    }

    fn on_disconnected(&mut self, _transport: &mut dyn Transport) {
        info!("disconnected");
        self.registered = false;
        self.pending_stream = None;
    }

    fn on_registration_ack(
        &mut self,
        transport: &mut dyn Transport,
        _header: &Header,
        ack: &RegistrationAck,
    ) {
        match ack.check() {
            Ok(RegistrationAckState::AlreadyRegistered) => info!("device was already registered"),
            Ok(_) => info!("device registered"),
            Err(e) => {
                warn!(error = %e, "registration rejected");
                return;
            }
        }
        self.registered = true;
        self.create_stream(transport);
        if let Err(e) = self.send_test_events(transport, None) {
            warn!(error = %e, "unable to send test events");
        }
    }

    fn on_device_stream_ack(
        &mut self,
        _transport: &mut dyn Transport,
        _header: &Header,
        ack: &DeviceStreamAck,
    ) {
        if self.pending_stream.as_deref() != Some(ack.stream_id.as_str()) {
            debug!(stream_id = %ack.stream_id, "ack for unknown stream ignored");
            return;
        }
        self.pending_stream = None;

        match DeviceStreamAckState::try_from(ack.state) {
            Ok(DeviceStreamAckState::StreamExists) => info!("stream already existed"),
            Ok(DeviceStreamAckState::StreamCreated) => info!("stream created"),
            _ => warn!(stream_id = %ack.stream_id, "unable to create stream"),
        }
        if ack.is_usable() {
            self.start_streaming(ack.stream_id.clone());
        }
    }

    fn on_stream_data_received(
        &mut self,
        _transport: &mut dyn Transport,
        _header: &Header,
        chunk: &DeviceStreamData,
    ) {
        info!(
            stream_id = %chunk.stream_id,
            sequence = chunk.sequence_number,
            bytes = chunk.data.len(),
            "received stream data"
        );
    }

    fn on_dispatch_error(&mut self, _transport: &mut dyn Transport, error: &DispatchError) {
        warn!(error = %error, "command rejected");
    }
}

/// Produces chunks for `duration` and posts each one to the host thread.
fn capture(main: MainThread<Client>, hardware_id: String, stream_id: String, duration: Duration) {
    let deadline = Instant::now() + duration;
    let mut sequence = 0u64;

    while Instant::now() < deadline {
        // stands in for a blocking read from the microphone
        std::thread::sleep(CHUNK_INTERVAL);
        let chunk = synthetic_chunk(sequence, CHUNK_SAMPLES);

        let hardware_id = hardware_id.clone();
        let stream_id = stream_id.clone();
        let posted = main.run_on_main_thread(move |client: &mut Client| {
            if let Err(e) =
                client.send_device_stream_data(&hardware_id, None, &stream_id, sequence, &chunk)
            {
                warn!(stream_id = %stream_id, sequence, error = %e, "unable to send chunk");
            }
        });
        if posted.is_err() {
            debug!("host stopped, ending capture");
            return;
        }
        sequence += 1;
    }

    info!(stream_id = %stream_id, chunks = sequence, "finished streaming");
}

/// 16-bit little-endian PCM of a steady tone, continuous across chunks.
pub fn synthetic_chunk(sequence: u64, samples: usize) -> Vec<u8> {
    let first = sequence * samples as u64;
    let mut chunk = Vec::with_capacity(samples * 2);
    for i in 0..samples as u64 {
        let t = (first + i) as f64 / f64::from(SAMPLE_RATE);
        let sample = ((t * TONE_HZ * TAU).sin() * AMPLITUDE) as i16;
        chunk.extend_from_slice(&sample.to_le_bytes());
    }
    chunk
}
