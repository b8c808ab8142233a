use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::PitboardError;
use crate::classifier::{self, DisplayEvent, SentState};
use crate::config::AppConfig;
use crate::notifier::{
    Coalescer, Frame, NotificationClass, NotificationTransport, PublishOutcome,
};
use crate::telemetry::producer::TelemetrySource;
use crate::telemetry::{
    Driver, Snapshot, collector, format_irating, format_lap_time, format_session_time,
};

const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const MIN_POLL_INTERVAL_MS: u64 = 50;

pub const STATUS_WAITING: &str = "Waiting for iRacing client...";
pub const STATUS_CONNECTED: &str = "iRacing client detected.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayField {
    IRating,
    License,
    BestLap,
    LastLap,
    Position,
    Laps,
    Fuel,
    TimeRemaining,
    TrackTemp,
}

/// Read-only, already-formatted updates for the display sink. The sink
/// never reaches back into pipeline state.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayUpdate {
    Status { connected: bool, message: String },
    Field { field: DisplayField, text: String },
}

/// Owns every piece of mutable pipeline state and runs the whole
/// snapshot -> classify -> notify chain on one thread. Nothing here is
/// shared: the display sink gets formatted strings over a channel and the
/// connection monitor is a lower-cadence step of the same loop, so cycles
/// can never overlap.
pub struct Pipeline<S: TelemetrySource, T: NotificationTransport> {
    source: S,
    transport: T,
    config: AppConfig,
    display: Sender<DisplayUpdate>,
    state: ConnectionState,
    driver: Option<Driver>,
    sent: SentState,
    coalescer: Coalescer,
}

impl<S: TelemetrySource, T: NotificationTransport> Pipeline<S, T> {
    pub fn new(source: S, transport: T, config: AppConfig, display: Sender<DisplayUpdate>) -> Self {
        Self {
            source,
            transport,
            config,
            display,
            state: ConnectionState::Disconnected,
            driver: None,
            sent: SentState::default(),
            coalescer: Coalescer::new(),
        }
    }

    pub fn with_coalescer(mut self, coalescer: Coalescer) -> Self {
        self.coalescer = coalescer;
        self
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// One connection-monitor step. Connected-ness is re-derived from the
    /// source every time, a single missed edge can not wedge the machine.
    pub fn check_connection(&mut self) {
        let now_connected = if self.source.is_connected() {
            true
        } else {
            if let Err(e) = self.source.startup() {
                debug!("sim not reachable: {}", e);
            }
            self.source.is_connected()
        };

        match (self.state, now_connected) {
            (ConnectionState::Disconnected, true) => self.on_connection(),
            (ConnectionState::Connected, false) => self.on_disconnection(),
            _ => {}
        }
    }

    fn on_connection(&mut self) {
        info!("{}", STATUS_CONNECTED);
        self.state = ConnectionState::Connected;
        self.sent.reset();
        self.coalescer.reset();
        self.push(DisplayUpdate::Status {
            connected: true,
            message: STATUS_CONNECTED.to_string(),
        });

        self.refresh_driver();
        self.publish_ratings();
    }

    fn on_disconnection(&mut self) {
        info!("{}", STATUS_WAITING);
        self.state = ConnectionState::Disconnected;
        self.driver = None;
        self.sent.reset();
        self.coalescer.reset();
        self.source.shutdown();
        self.push(DisplayUpdate::Status {
            connected: false,
            message: STATUS_WAITING.to_string(),
        });
    }

    fn refresh_driver(&mut self) {
        match self.source.driver() {
            Ok(driver) => {
                if self.config.fields.ratings {
                    self.push(DisplayUpdate::Field {
                        field: DisplayField::IRating,
                        text: format_irating(driver.i_rating),
                    });
                    self.push(DisplayUpdate::Field {
                        field: DisplayField::License,
                        text: driver.lic_string(),
                    });
                }
                self.driver = Some(driver);
            }
            Err(e) => {
                debug!("could not read driver roster: {}", e);
                self.driver = None;
            }
        }
    }

    /// One poll cycle. Errors never escape: a cycle that fails is logged
    /// and the loop moves on to the next tick.
    pub fn cycle(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.run_cycle() {
            match e {
                PitboardError::NoTelemetryData => debug!("no telemetry data this tick"),
                e => error!("telemetry cycle failed: {}", e),
            }
        }
    }

    fn run_cycle(&mut self) -> Result<(), PitboardError> {
        let frame = self.source.frame()?;
        let snapshot = collector::collect(&frame);

        self.push_fields(&snapshot);

        // The roster occasionally lags the connection handshake, retry
        // until the driver entry shows up.
        if self.driver.is_none() {
            self.refresh_driver();
        }

        let (events, flag_active) =
            classifier::classify(&snapshot, &self.sent, &self.config.fields);

        if events.is_empty() {
            // nothing pending, keep the diff baseline current and fall back
            // to the rating pair as the default display
            self.sent.absorb(&snapshot);
            self.publish_ratings();
            return Ok(());
        }

        let start_hidden_fired = events.iter().any(
            |e| matches!(e, DisplayEvent::Flag(spec) if spec.bit == classifier::FLAG_START_HIDDEN),
        );
        let frames: Vec<Frame> = events.iter().flat_map(DisplayEvent::frames).collect();
        let class = if flag_active {
            NotificationClass::Flags
        } else {
            NotificationClass::Changes
        };

        let outcome = self.coalescer.publish(frames, class, &mut self.transport);
        if outcome.rendered() {
            self.sent.absorb(&snapshot);
            if start_hidden_fired {
                self.sent.start_hidden_shown = true;
            }
        }
        Ok(())
    }

    fn publish_ratings(&mut self) -> PublishOutcome {
        if !self.config.fields.ratings {
            return PublishOutcome::Nothing;
        }
        let Some(driver) = &self.driver else {
            return PublishOutcome::Nothing;
        };
        let frames = classifier::rating_event(driver).frames();
        self.coalescer
            .publish(frames, NotificationClass::Ratings, &mut self.transport)
    }

    fn push_fields(&mut self, snapshot: &Snapshot) {
        if self.config.fields.best_lap
            && let Some(best) = snapshot.best_lap_time
        {
            self.push(DisplayUpdate::Field {
                field: DisplayField::BestLap,
                text: format_lap_time(best),
            });
        }
        if let Some(last) = snapshot.last_lap_time {
            self.push(DisplayUpdate::Field {
                field: DisplayField::LastLap,
                text: format_lap_time(last),
            });
        }
        if self.config.fields.position
            && let Some(text) = snapshot.position_text()
        {
            self.push(DisplayUpdate::Field {
                field: DisplayField::Position,
                text,
            });
        }
        if self.config.fields.laps
            && let Some(text) = snapshot.laps_text()
        {
            self.push(DisplayUpdate::Field {
                field: DisplayField::Laps,
                text,
            });
        }
        if let Some(fuel) = snapshot.fuel_remaining {
            self.push(DisplayUpdate::Field {
                field: DisplayField::Fuel,
                text: format!("{:.1} L", fuel),
            });
        }
        if let Some(remaining) = snapshot.time_remaining {
            self.push(DisplayUpdate::Field {
                field: DisplayField::TimeRemaining,
                text: format_session_time(remaining),
            });
        }
        if let Some(temp) = snapshot.track_temperature {
            self.push(DisplayUpdate::Field {
                field: DisplayField::TrackTemp,
                text: format!("{:.1} °C", temp),
            });
        }
    }

    fn push(&self, update: DisplayUpdate) {
        if let Err(e) = self.display.send(update) {
            debug!("display sink went away: {}", e);
        }
    }

    /// Drive the pipeline until `running` flips false. The poll loop and
    /// the connection monitor share this one thread; a cycle stalled on a
    /// network call delays the next tick but never runs alongside it.
    pub fn run(mut self, running: Arc<AtomicBool>) {
        let poll_interval =
            Duration::from_millis(self.config.poll_interval_ms.max(MIN_POLL_INTERVAL_MS));
        let mut last_check: Option<Instant> = None;

        while running.load(Ordering::Relaxed) {
            let check_due = last_check
                .map(|at| at.elapsed() >= CONNECTION_CHECK_INTERVAL)
                .unwrap_or(true);
            if check_due {
                self.check_connection();
                last_check = Some(Instant::now());
            }

            self.cycle();
            thread::sleep(poll_interval);
        }
    }
}
