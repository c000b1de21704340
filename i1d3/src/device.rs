//! High-level instrument interface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use i1d3_core::codec::{BigEndian, LittleEndian};
use i1d3_core::constants::{eeprom, integration, timeouts};
use i1d3_core::packet::RequestFrame;
use i1d3_core::unlock::{self, UnlockResponder, UnlockTable};
use i1d3_core::{Command, Packet, Response, Session};
use i1d3_transport::Transport;
use i1d3_types::{
    CalibrationKind, CalibrationStatus, DeviceInfo, Geometry, LedPattern, MeasureMode,
    RefreshEstimate,
};

use crate::adaptive::{self, MeasureConfig, ReadingPlan};
use crate::channel::CommandChannel;
use crate::error::{Error, Result};
use crate::hooks::{BackgroundPoller, SetupPrompt};

type AbortQuery = dyn Fn() -> bool + Send + Sync;

/// i1Display Pro family colorimeter
///
/// All methods take `&self`; a `Colorimeter` can be shared between threads
/// and only one exchange with the instrument is ever in flight.
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "hid")]
/// # fn main() -> i1d3::Result<()> {
/// use i1d3::{Colorimeter, HidTransport, MeasureMode};
///
/// let colorimeter = Colorimeter::new(HidTransport::open()?)
///     .with_setup_prompt(|kind: i1d3::CalibrationKind| {
///         println!("Prepare the instrument for {kind} calibration");
///         true
///     });
///
/// let info = colorimeter.attach()?;
/// println!("{}", info);
///
/// let hz = colorimeter.measure(MeasureMode::Adaptive)?;
/// println!("{:?}", hz);
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "hid"))]
/// # fn main() {}
/// ```
pub struct Colorimeter {
    channel: CommandChannel,
    session: Session,
    timeout: Duration,
    config: MeasureConfig,
    unlock_table: UnlockTable,
    responder: Option<Arc<dyn UnlockResponder>>,
    abort: Option<Arc<AbortQuery>>,
    setup: Option<Arc<dyn SetupPrompt>>,
    poller: Option<Arc<dyn BackgroundPoller>>,

    /// Setup confirmed out of band via [`Colorimeter::confirm_setup`]
    white_ready: AtomicBool,
    dark_ready: AtomicBool,
}

impl Colorimeter {
    /// Create a colorimeter over `transport`
    pub fn new(transport: impl Transport + 'static) -> Self {
        let session = Session::new();
        Self {
            channel: CommandChannel::new(Box::new(transport), session.clone()),
            session,
            timeout: Duration::from_secs_f64(timeouts::QUERY),
            config: MeasureConfig::default(),
            unlock_table: UnlockTable::new(),
            responder: None,
            abort: None,
            setup: None,
            poller: None,
            white_ready: AtomicBool::new(false),
            dark_ready: AtomicBool::new(false),
        }
    }

    /// Set query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the ordered unlock keys
    pub fn with_unlock_table(mut self, table: UnlockTable) -> Self {
        self.unlock_table = table;
        self
    }

    /// Set the challenge/response transform
    pub fn with_responder(mut self, responder: impl UnlockResponder + 'static) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Set the abort query consulted between measurement steps
    pub fn with_abort<F>(mut self, abort: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.abort = Some(Arc::new(abort));
        self
    }

    pub fn with_setup_prompt(mut self, prompt: impl SetupPrompt + 'static) -> Self {
        self.setup = Some(Arc::new(prompt));
        self
    }

    pub fn with_poller(mut self, poller: Arc<dyn BackgroundPoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Set the adaptive controller's tunables
    pub fn with_config(mut self, config: MeasureConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the integration time of a reading (clamped to [0.01 s, 20 s])
    pub fn with_integration_time(self, seconds: f64) -> Self {
        self.session.set_integration_time(seconds);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// Set the integration time, returning the value actually used
    pub fn set_integration_time(&self, seconds: f64) -> f64 {
        self.session.set_integration_time(seconds)
    }

    /// Identify the instrument and unlock it if needed
    pub fn attach(&self) -> Result<DeviceInfo> {
        info!("Attaching to {}...", self.channel.description());

        self.query_identity()?;
        self.unlock()?;

        let info = self.session.device_info();
        info!("Attached: {}", info);
        Ok(info)
    }

    /// Read the identity strings
    pub fn query_identity(&self) -> Result<DeviceInfo> {
        debug!("Querying identity...");

        let product_name = self.query(Command::GetProductName)?.string(2)?;
        let product_type = self.query(Command::GetProductType)?.u16::<LittleEndian>(3)?;
        let firmware_version = self.query(Command::GetFirmwareVersion)?.string(2)?;
        let firmware_date = self.query(Command::GetFirmwareDate)?.string(2)?;
        let info = self.query(Command::GetInfo)?.string(2)?;

        let mut identity = DeviceInfo::new(product_name, firmware_version);
        identity.product_type = product_type;
        identity.firmware_date = firmware_date;
        identity.info = info;

        self.session.set_device_info(identity);
        let identity = self.session.device_info();

        debug!("Identity: {}", identity);
        Ok(identity)
    }

    /// Raw status bytes
    pub fn query_status(&self) -> Result<[u8; 3]> {
        let response = self.query(Command::GetStatus)?;
        let mut status = [0u8; 3];
        status.copy_from_slice(response.bytes(2, 3)?);
        Ok(status)
    }

    /// Whether the firmware currently refuses restricted commands
    pub fn is_locked(&self) -> Result<bool> {
        let response = self.query(Command::GetLocked)?;
        Ok(unlock::is_locked(&response))
    }

    /// Unlock restricted commands
    ///
    /// Tries every table entry whose product name matches, in order. The
    /// accepted entry's variant tags are adopted and both calibrations are
    /// re-armed.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownKey`] if no entry is accepted.
    pub fn unlock(&self) -> Result<()> {
        let mut product_name = self.session.device_info().product_name;
        if product_name.is_empty() {
            product_name = self.query_identity()?.product_name;
        }

        if !self.is_locked()? {
            let (variant, sub_variant) = self
                .unlock_table
                .candidates(&product_name)
                .next()
                .map(|e| (e.variant, e.sub_variant))
                .unwrap_or_default();
            debug!("Instrument already unlocked");
            self.session.mark_unlocked(variant, sub_variant);
            return Ok(());
        }

        let Some(responder) = self.responder.as_ref() else {
            warn!("Instrument is locked and no unlock responder is configured");
            return Err(Error::UnknownKey(product_name));
        };

        for entry in self.unlock_table.candidates(&product_name) {
            let challenge = self.query(Command::LockChallenge)?;
            let reply = responder.respond(challenge.frame(), entry.key);
            let packet = Packet::with_payload(Command::LockResponse, reply)?;

            let accepted = match self.exchange_with(&packet, self.timeout) {
                Ok(response) => unlock::is_accepted(&response),
                Err(Error::Core(i1d3_core::Error::BadStatus { status, .. })) => {
                    debug!("Unlock response refused with status 0x{:02X}", status);
                    false
                }
                Err(e) => return Err(e),
            };

            if accepted {
                info!(
                    variant = %entry.variant,
                    sub_variant = %entry.sub_variant,
                    "Unlocked"
                );
                self.session.mark_unlocked(entry.variant, entry.sub_variant);
                return Ok(());
            }

            debug!("Key for {} ({}) rejected", entry.variant, entry.sub_variant);
        }

        Err(Error::UnknownKey(product_name))
    }

    /// Take one reading, returning black-corrected Hz per channel
    ///
    /// Runs outstanding calibrations first; on a display the refresh rate is
    /// estimated once per mode.
    pub fn measure(&self, mode: MeasureMode) -> Result<[f64; 3]> {
        if self.is_aborted() {
            return Err(Error::Aborted);
        }

        self.ensure_unlocked()?;
        self.ensure_calibrated()?;

        let refresh = match (mode, self.session.geometry()) {
            (MeasureMode::FrequencyOnly, _) | (_, Geometry::Reflective) => {
                self.session.refresh().unwrap_or_default()
            }
            _ => self.estimate_refresh()?,
        };

        let plan = ReadingPlan {
            mode,
            integration_time: self.session.integration_time(),
            quantization: refresh.quantization,
            black_level: self.session.black_level(),
        };

        let hz = adaptive::measure(self, &self.config, &plan)?;
        debug!(?hz, ?mode, "reading");
        Ok(hz)
    }

    /// Switch measurement geometry
    ///
    /// Invalidates the refresh estimate and re-arms both calibrations.
    pub fn set_geometry(&self, geometry: Geometry) {
        info!(%geometry, "Geometry changed");
        self.session.set_geometry(geometry);
    }

    pub fn request_calibration(&self) {
        self.session.request_calibration();
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.session.calibration_status()
    }

    /// Last refresh estimate, if one was made in this mode
    pub fn refresh(&self) -> Option<RefreshEstimate> {
        self.session.refresh()
    }

    /// Record that a human has prepared the instrument for `kind`
    ///
    /// Consumed by the next calibration of that kind; an alternative to a
    /// [`SetupPrompt`] for callers that prompt outside the driver.
    pub fn confirm_setup(&self, kind: CalibrationKind) {
        self.ready_flag(kind).store(true, Ordering::Release);
    }

    /// Calibrate against the white reference
    pub fn calibrate_white(&self) -> Result<()> {
        self.ensure_unlocked()?;
        self.await_setup(CalibrationKind::White)?;

        let sample = self.measure_frequency(self.session.integration_time())?;
        self.session.set_white_reference(sample.counts);
        self.session.calibration_done(CalibrationKind::White);

        info!(counts = ?sample.counts, "White calibration done");
        Ok(())
    }

    /// Calibrate the black level with the sensor capped
    ///
    /// Only emissive and transmissive geometries have a black level.
    pub fn calibrate_dark(&self) -> Result<()> {
        let geometry = self.session.geometry();
        if geometry == Geometry::Reflective {
            return Err(i1d3_types::Error::Validation(format!(
                "dark calibration does not apply to {geometry} geometry"
            ))
            .into());
        }

        self.ensure_unlocked()?;
        self.set_led(LedPattern::OFF)?;
        self.await_setup(CalibrationKind::Dark)?;

        let sample = self.measure_frequency(integration::DARK)?;
        let black = sample.hz();
        self.session.set_black_level(black);
        self.session.calibration_done(CalibrationKind::Dark);

        info!(black = ?black, "Dark calibration done");
        Ok(())
    }

    /// Read `len` bytes of internal EEPROM from `address`
    pub fn read_internal_eeprom(&self, address: u8, len: usize) -> Result<Vec<u8>> {
        let start = address as usize;
        check_range(start, len, eeprom::INTERNAL_SIZE)?;

        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let offset = start + data.len();
            let chunk = (len - data.len()).min(eeprom::INTERNAL_CHUNK);

            let packet = RequestFrame::new(Command::ReadInternalEeprom)
                .u8(1, offset as u8)?
                .u8(2, chunk as u8)?
                .build()?;
            let response = self.exchange_with(&packet, self.timeout)?;
            data.extend_from_slice(response.bytes(4, chunk)?);
        }

        debug!(address, len, "Read internal EEPROM");
        Ok(data)
    }

    /// Read `len` bytes of external EEPROM from `address`
    pub fn read_external_eeprom(&self, address: u16, len: usize) -> Result<Vec<u8>> {
        let start = address as usize;
        check_range(start, len, eeprom::EXTERNAL_SIZE)?;

        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let offset = start + data.len();
            let chunk = (len - data.len()).min(eeprom::EXTERNAL_CHUNK);

            let packet = RequestFrame::new(Command::ReadExternalEeprom)
                .u16::<BigEndian>(3, offset as u16)?
                .u8(5, chunk as u8)?
                .build()?;
            let response = self.exchange_with(&packet, self.timeout)?;
            data.extend_from_slice(response.bytes(5, chunk)?);
        }

        debug!(address, len, "Read external EEPROM");
        Ok(data)
    }

    /// Drive the indicator LED
    pub fn set_led(&self, pattern: LedPattern) -> Result<()> {
        let packet = RequestFrame::new(Command::SetLed)
            .u8(1, pattern.mode as u8)?
            .u8(2, pattern.off_ticks)?
            .u8(3, pattern.on_ticks)?
            .u8(4, pattern.count)?
            .build()?;
        self.exchange_with(&packet, self.timeout)?;

        debug!(mode = %pattern.mode, "LED set");
        Ok(())
    }

    // Helper methods

    pub(crate) fn ensure_unlocked(&self) -> Result<()> {
        if self.session.is_unlocked() {
            return Ok(());
        }
        self.unlock()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|abort| abort())
    }

    pub(crate) fn poller(&self) -> Option<&dyn BackgroundPoller> {
        self.poller.as_deref()
    }

    /// Exchange `packet`, unlocking first if its command is restricted
    pub(crate) fn exchange_with(&self, packet: &Packet, timeout: Duration) -> Result<Response> {
        if packet.command.is_restricted() {
            self.ensure_unlocked()?;
        }
        self.channel.exchange(packet, timeout)
    }

    fn query(&self, command: Command) -> Result<Response> {
        self.exchange_with(&Packet::new(command), self.timeout)
    }

    fn ensure_calibrated(&self) -> Result<()> {
        let pending = self
            .session
            .calibration_status()
            .pending_for(self.session.geometry());

        for kind in pending {
            match kind {
                CalibrationKind::White => self.calibrate_white()?,
                CalibrationKind::Dark => self.calibrate_dark()?,
            }
        }
        Ok(())
    }

    fn await_setup(&self, kind: CalibrationKind) -> Result<()> {
        if self.ready_flag(kind).swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.setup {
            Some(prompt) if prompt.confirm(kind) => Ok(()),
            _ => Err(Error::NeedsManualSetup(kind)),
        }
    }

    fn ready_flag(&self, kind: CalibrationKind) -> &AtomicBool {
        match kind {
            CalibrationKind::White => &self.white_ready,
            CalibrationKind::Dark => &self.dark_ready,
        }
    }
}

fn check_range(start: usize, len: usize, size: usize) -> Result<()> {
    if start + len > size {
        return Err(i1d3_types::Error::Validation(format!(
            "EEPROM range {start}..{} exceeds {size} bytes",
            start + len
        ))
        .into());
    }
    Ok(())
}
