use crate::PitboardError;

use super::Driver;

#[allow(unused)]
const CONN_RETRY_WAIT_MS: u64 = 200;
#[allow(unused)]
const STARTUP_ATTEMPT_TIMEOUT_MS: u64 = 900;

/// One frozen read of every field the pipeline consumes. Building this value
/// is the consistency bracket: all keyed reads for a cycle come from the same
/// underlying telemetry buffer, so a snapshot never mixes two sim ticks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceFrame {
    pub position: Option<i32>,
    pub cars_in_field: Option<i32>,
    pub laps_completed: Option<i32>,
    pub laps_remaining_raw: Option<i32>,
    pub last_lap_time_s: Option<f32>,
    pub best_lap_time_s: Option<f32>,
    pub fuel_level_l: Option<f32>,
    pub session_time_remain_s: Option<f64>,
    pub session_flags: u32,
    pub track_temp_c: Option<f32>,
}

/// A trait for the shared-memory telemetry interface of the racing sim.
///
/// The live implementation connects to iRacing; the mock replays scripted
/// frames for tests and offline runs. Connected-ness is level-triggered: the
/// connection monitor re-derives it from `is_connected()` on every check
/// rather than trusting a single edge, so a sim that toggles rapidly cannot
/// wedge the state machine.
pub trait TelemetrySource {
    /// Attempt to reach the sim. Bounded, a sim that is not running results
    /// in an error and the monitor simply tries again on its next check.
    fn startup(&mut self) -> Result<(), PitboardError>;

    /// Drop the connection so a later reconnect starts clean.
    fn shutdown(&mut self);

    fn is_connected(&self) -> bool;

    /// Read the current telemetry buffer into an owned [`SourceFrame`].
    ///
    /// # Errors
    ///
    /// Returns an error when the sim disappears mid-call; the caller treats
    /// that as "no data this tick", never as a cycle-fatal condition.
    fn frame(&mut self) -> Result<SourceFrame, PitboardError>;

    /// The local driver's roster entry, looked up by car index. Valid once
    /// per connection; identity and ratings do not change mid-session.
    fn driver(&mut self) -> Result<Driver, PitboardError>;
}

#[cfg(windows)]
pub struct IRacingTelemetrySource {
    client: Option<simetry::iracing::Client>,
    connected: bool,
    retry_wait_ms: u64,
    startup_timeout_ms: u64,
}

#[cfg(windows)]
impl Default for IRacingTelemetrySource {
    fn default() -> Self {
        IRacingTelemetrySource::new(CONN_RETRY_WAIT_MS, STARTUP_ATTEMPT_TIMEOUT_MS)
    }
}

#[cfg(windows)]
impl IRacingTelemetrySource {
    pub fn new(retry_wait_ms: u64, startup_timeout_ms: u64) -> Self {
        Self {
            client: None,
            connected: false,
            retry_wait_ms,
            startup_timeout_ms,
        }
    }

    fn next_state(&mut self) -> Result<simetry::iracing::SimState, PitboardError> {
        let client = self
            .client
            .as_mut()
            .ok_or(PitboardError::MissingIRacingSession)?;

        let state = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(client.next_sim_state());

        match state {
            Some(state) => {
                self.connected = true;
                Ok(state)
            }
            None => {
                self.connected = false;
                Err(PitboardError::NoTelemetryData)
            }
        }
    }
}

#[cfg(windows)]
impl TelemetrySource for IRacingTelemetrySource {
    fn startup(&mut self) -> Result<(), PitboardError> {
        use std::time::Duration;

        if self.client.is_some() && self.connected {
            return Ok(());
        }

        let retry_delay = Duration::from_millis(self.retry_wait_ms);
        let attempt_budget = Duration::from_millis(self.startup_timeout_ms);

        // Client::connect retries forever; bound each attempt so the
        // connection monitor keeps its cadence while the sim is down.
        let client = tokio::runtime::Runtime::new().unwrap().block_on(async {
            tokio::time::timeout(attempt_budget, simetry::iracing::Client::connect(retry_delay))
                .await
        });

        match client {
            Ok(client) => {
                self.client = Some(client);
                self.connected = true;
                Ok(())
            }
            Err(_) => {
                self.connected = false;
                Err(PitboardError::IRacingConnectionTimeout)
            }
        }
    }

    fn shutdown(&mut self) {
        self.client = None;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected
    }

    fn frame(&mut self) -> Result<SourceFrame, PitboardError> {
        let state = self.next_state()?;

        let cars_in_field = state.session_info()["DriverInfo"]["Drivers"]
            .as_sequence()
            .map(|drivers| drivers.len() as i32);

        Ok(SourceFrame {
            position: state.read_name("PlayerCarPosition"),
            cars_in_field,
            laps_completed: state.read_name("LapCompleted"),
            laps_remaining_raw: state.read_name("SessionLapsRemain"),
            last_lap_time_s: state.read_name("LapLastLapTime"),
            best_lap_time_s: state.read_name("LapBestLapTime"),
            fuel_level_l: state.read_name("FuelLevel"),
            session_time_remain_s: state.read_name("SessionTimeRemain"),
            session_flags: state.read_name::<i32>("SessionFlags").unwrap_or(0) as u32,
            track_temp_c: state.read_name("TrackTemp"),
        })
    }

    fn driver(&mut self) -> Result<Driver, PitboardError> {
        let state = self.next_state()?;
        let session_info = state.session_info();

        let car_index = session_info["DriverInfo"]["DriverCarIdx"]
            .as_i64()
            .ok_or_else(|| PitboardError::TelemetrySourceError {
                description: "Roster is missing DriverCarIdx".to_string(),
            })? as i32;

        let drivers = session_info["DriverInfo"]["Drivers"]
            .as_sequence()
            .ok_or_else(|| PitboardError::TelemetrySourceError {
                description: "Roster is missing the driver list".to_string(),
            })?;

        for entry in drivers {
            if entry["CarIdx"].as_i64() != Some(car_index as i64) {
                continue;
            }

            let lic_string = entry["LicString"].as_str().unwrap_or_default();
            let (license_class, safety_rating) = Driver::parse_lic_string(lic_string);

            return Ok(Driver {
                car_index,
                name: entry["UserName"].as_str().unwrap_or("Unknown").to_string(),
                customer_id: entry["UserID"].as_i64().unwrap_or(0),
                i_rating: entry["IRating"].as_i64().unwrap_or(0) as i32,
                license_class,
                safety_rating,
            });
        }

        Err(PitboardError::TelemetrySourceError {
            description: format!("No roster entry for car index {}", car_index),
        })
    }
}

/// A mock telemetry source replaying scripted frames.
///
/// Lets the pipeline, classifier and coalescer run without a live sim:
/// tests script a sequence of frames (and connection drops) and assert on
/// the notifications that come out the other end.
pub struct MockTelemetrySource {
    frames: Vec<SourceFrame>,
    cur_frame: usize,
    connected: bool,
    /// Flip to false to simulate the sim process being closed: startup
    /// attempts fail until it is set back.
    pub sim_running: bool,
    pub driver: Driver,
}

impl Default for MockTelemetrySource {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            cur_frame: 0,
            connected: false,
            sim_running: true,
            driver: Driver::default(),
        }
    }
}

#[allow(dead_code)]
impl MockTelemetrySource {
    pub fn from_frames(frames: Vec<SourceFrame>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    pub fn push_frame(&mut self, frame: SourceFrame) {
        self.frames.push(frame);
    }

    /// Simulate the sim process going away: the current connection drops
    /// and startup attempts fail until [`Self::sim_running`] is restored.
    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.sim_running = false;
    }
}

impl TelemetrySource for MockTelemetrySource {
    fn startup(&mut self) -> Result<(), PitboardError> {
        if !self.sim_running {
            return Err(PitboardError::IRacingConnectionTimeout);
        }
        self.connected = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn frame(&mut self) -> Result<SourceFrame, PitboardError> {
        if !self.connected {
            return Err(PitboardError::NoTelemetryData);
        }
        if self.cur_frame >= self.frames.len() {
            return Err(PitboardError::NoTelemetryData);
        }

        let frame = self.frames[self.cur_frame].clone();
        self.cur_frame += 1;
        Ok(frame)
    }

    fn driver(&mut self) -> Result<Driver, PitboardError> {
        if !self.connected {
            return Err(PitboardError::MissingIRacingSession);
        }
        Ok(self.driver.clone())
    }
}
