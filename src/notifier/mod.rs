pub mod lametric;

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::PitboardError;

/// Pause between queue deletions so a burst of dismissals does not
/// overwhelm the device's tiny HTTP server.
const DISMISS_PACING: Duration = Duration::from_millis(200);

/// Transient change notifications cycle twice on the device then hide.
const CHANGE_CYCLES: u32 = 2;

/// One (icon, text) pair within a notification's display cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub icon: String,
    pub text: String,
}

impl Frame {
    pub fn new(icon: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            icon: icon.into(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationModel {
    /// 0 keeps the notification up until superseded, N > 0 repeats it N
    /// times then hides it
    pub cycles: u32,
    pub frames: Vec<Frame>,
}

/// The wire payload POSTed to the device, compared by value against the
/// previously transmitted payload to suppress duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub priority: Priority,
    pub icon_type: String,
    pub model: NotificationModel,
}

impl Notification {
    pub fn new(priority: Priority, cycles: u32, frames: Vec<Frame>) -> Self {
        Self {
            priority,
            icon_type: "none".to_string(),
            model: NotificationModel { cycles, frames },
        }
    }
}

/// A notification as reported by the device's queue listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub model: QueuedModel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedModel {
    #[serde(default)]
    pub cycles: u32,
}

/// What kind of notification a batch of frames becomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationClass {
    /// Race-control flags: critical, shown until superseded
    Flags,
    /// Position/lap/best-lap changes: shown briefly, then auto-hide
    Changes,
    /// The rating pair, the default display while nothing else qualifies
    Ratings,
}

/// Access to the remote device's notification queue. All calls are
/// best-effort and may fail independently.
pub trait NotificationTransport {
    /// POST a notification, returning the device-assigned id.
    fn send(&mut self, notification: &Notification) -> Result<String, PitboardError>;

    /// List notifications currently queued on the device.
    fn queued(&mut self) -> Result<Vec<QueuedNotification>, PitboardError>;

    /// Dismiss one queued notification by id.
    fn dismiss(&mut self, id: &str) -> Result<bool, PitboardError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Suppressed: the device already shows this exact payload
    Duplicate,
    /// Nothing to send (empty frame list)
    Nothing,
    /// Transport failed, the payload stays eligible for retry next cycle
    Failed,
}

impl PublishOutcome {
    /// Whether the device now shows the candidate payload.
    pub fn rendered(&self) -> bool {
        matches!(self, PublishOutcome::Sent | PublishOutcome::Duplicate)
    }
}

/// Turns classified frames into at most one notification per cycle and
/// keeps the device queue tidy.
pub struct Coalescer {
    last_sent: Option<Notification>,
    last_ratings: Option<Notification>,
    dismiss_pacing: Duration,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            last_sent: None,
            last_ratings: None,
            dismiss_pacing: DISMISS_PACING,
        }
    }

    /// Tests run with pacing disabled.
    pub fn with_dismiss_pacing(dismiss_pacing: Duration) -> Self {
        Self {
            dismiss_pacing,
            ..Self::new()
        }
    }

    /// Forget everything transmitted so far. Called on every connection
    /// transition so a reconnect never suppresses a payload that matches
    /// one from the previous session.
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.last_ratings = None;
    }

    /// Build and transmit at most one notification for this cycle.
    ///
    /// Transport failures are logged and swallowed here; a failed send
    /// leaves the de-duplication state untouched so the same payload is
    /// retried on the next cycle it still qualifies.
    pub fn publish(
        &mut self,
        frames: Vec<Frame>,
        class: NotificationClass,
        transport: &mut dyn NotificationTransport,
    ) -> PublishOutcome {
        if frames.is_empty() {
            return PublishOutcome::Nothing;
        }

        let notification = match class {
            NotificationClass::Flags => Notification::new(Priority::Critical, 0, frames),
            NotificationClass::Changes => {
                Notification::new(Priority::Info, CHANGE_CYCLES, frames)
            }
            NotificationClass::Ratings => Notification::new(Priority::Info, 0, frames),
        };

        if self.last_sent.as_ref() == Some(&notification) {
            debug!("suppressing duplicate notification");
            return PublishOutcome::Duplicate;
        }
        // Ratings only go out again when the values actually changed, not
        // every time some transient notification displaced them.
        if class == NotificationClass::Ratings
            && self.last_ratings.as_ref() == Some(&notification)
        {
            return PublishOutcome::Duplicate;
        }

        match transport.send(&notification) {
            Ok(id) => {
                debug!("sent notification {}", id);
                self.dismiss_stale(&id, transport);
                if class == NotificationClass::Ratings {
                    self.last_ratings = Some(notification.clone());
                }
                self.last_sent = Some(notification);
                PublishOutcome::Sent
            }
            Err(PitboardError::DeviceNotConfigured) => {
                debug!("device not configured, skipping notification");
                PublishOutcome::Failed
            }
            Err(e) => {
                warn!("could not deliver notification: {}", e);
                PublishOutcome::Failed
            }
        }
    }

    /// Clear stale persistent entries so they don't pile up in the device
    /// queue. Only `cycles == 0` entries need this, transient ones age out
    /// on the device by themselves.
    fn dismiss_stale(&self, keep_id: &str, transport: &mut dyn NotificationTransport) {
        let queued = match transport.queued() {
            Ok(queued) => queued,
            Err(e) => {
                debug!("could not list queued notifications: {}", e);
                return;
            }
        };

        for entry in queued {
            if entry.id == keep_id || entry.model.cycles != 0 {
                continue;
            }
            if let Err(e) = transport.dismiss(&entry.id) {
                debug!("could not dismiss notification {}: {}", entry.id, e);
            }
            if !self.dismiss_pacing.is_zero() {
                thread::sleep(self.dismiss_pacing);
            }
        }
    }
}

/// An in-memory transport recording everything it is handed. Backs the
/// test suites and offline runs the way the mock telemetry source does on
/// the producer side.
#[derive(Default)]
pub struct MockNotificationTransport {
    pub sent: Vec<Notification>,
    pub queue: Vec<QueuedNotification>,
    pub dismissed: Vec<String>,
    pub fail_sends: bool,
    pub unconfigured: bool,
    next_id: usize,
}

impl MockNotificationTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }
}

impl NotificationTransport for MockNotificationTransport {
    fn send(&mut self, notification: &Notification) -> Result<String, PitboardError> {
        if self.unconfigured {
            return Err(PitboardError::DeviceNotConfigured);
        }
        if self.fail_sends {
            return Err(PitboardError::TransportError {
                description: "connection refused".to_string(),
            });
        }

        self.next_id += 1;
        let id = self.next_id.to_string();
        self.sent.push(notification.clone());
        self.queue.push(QueuedNotification {
            id: id.clone(),
            priority: None,
            model: QueuedModel {
                cycles: notification.model.cycles,
            },
        });
        Ok(id)
    }

    fn queued(&mut self) -> Result<Vec<QueuedNotification>, PitboardError> {
        Ok(self.queue.clone())
    }

    fn dismiss(&mut self, id: &str) -> Result<bool, PitboardError> {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.id != id);
        self.dismissed.push(id.to_string());
        Ok(self.queue.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coalescer() -> Coalescer {
        Coalescer::with_dismiss_pacing(Duration::ZERO)
    }

    fn flag_frames() -> Vec<Frame> {
        vec![Frame::new("a43490", "Finish")]
    }

    fn change_frames() -> Vec<Frame> {
        vec![
            Frame::new("i43591", "1:10.500"),
            Frame::new("a43652", "3 / 20"),
        ]
    }

    #[test]
    fn test_empty_frames_send_nothing() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();
        let outcome = coalescer.publish(Vec::new(), NotificationClass::Changes, &mut transport);
        assert_eq!(outcome, PublishOutcome::Nothing);
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_flag_class_is_critical_and_persistent() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();
        let outcome = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(outcome, PublishOutcome::Sent);

        let sent = &transport.sent[0];
        assert_eq!(sent.priority, Priority::Critical);
        assert_eq!(sent.model.cycles, 0);
        assert_eq!(sent.icon_type, "none");
        assert_eq!(sent.model.frames, flag_frames());
    }

    #[test]
    fn test_change_class_auto_hides() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();
        coalescer.publish(change_frames(), NotificationClass::Changes, &mut transport);

        let sent = &transport.sent[0];
        assert_eq!(sent.priority, Priority::Info);
        assert_eq!(sent.model.cycles, CHANGE_CYCLES);
    }

    #[test]
    fn test_identical_payload_is_suppressed() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();

        let first = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        let second = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(first, PublishOutcome::Sent);
        assert_eq!(second, PublishOutcome::Duplicate);
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn test_reset_forgets_the_last_payload() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();

        coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        coalescer.reset();
        let outcome = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(outcome, PublishOutcome::Sent);
        assert_eq!(transport.sent.len(), 2);
    }

    #[test]
    fn test_failed_send_retries_next_cycle() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::failing();

        let outcome = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(outcome, PublishOutcome::Failed);

        transport.fail_sends = false;
        let outcome = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(outcome, PublishOutcome::Sent);
    }

    #[test]
    fn test_unconfigured_device_is_a_quiet_noop() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport {
            unconfigured: true,
            ..Default::default()
        };

        let outcome = coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);
        assert_eq!(outcome, PublishOutcome::Failed);
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_stale_persistent_entries_are_dismissed() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();
        transport.queue = vec![
            QueuedNotification {
                id: "old-flag".to_string(),
                priority: None,
                model: QueuedModel { cycles: 0 },
            },
            QueuedNotification {
                id: "old-transient".to_string(),
                priority: None,
                model: QueuedModel { cycles: 2 },
            },
        ];

        coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);

        // the stale persistent entry goes, the transient one ages out on its
        // own and the fresh send stays
        assert_eq!(transport.dismissed, vec!["old-flag".to_string()]);
        assert_eq!(transport.queue.len(), 2);
    }

    #[test]
    fn test_ratings_resend_only_on_value_change() {
        let mut coalescer = coalescer();
        let mut transport = MockNotificationTransport::new();
        let ratings = vec![
            Frame::new("i43085", "5,429"),
            Frame::new("i43595", "A 4.11"),
        ];

        let first = coalescer.publish(ratings.clone(), NotificationClass::Ratings, &mut transport);
        assert_eq!(first, PublishOutcome::Sent);

        // a flag displaces the ratings display
        coalescer.publish(flag_frames(), NotificationClass::Flags, &mut transport);

        // same ratings again: suppressed even though the last payload differs
        let again = coalescer.publish(ratings, NotificationClass::Ratings, &mut transport);
        assert_eq!(again, PublishOutcome::Duplicate);

        // but a ratings change goes out
        let bumped = vec![
            Frame::new("i43085", "5,514"),
            Frame::new("i43595", "A 4.15"),
        ];
        let outcome = coalescer.publish(bumped, NotificationClass::Ratings, &mut transport);
        assert_eq!(outcome, PublishOutcome::Sent);
        assert_eq!(transport.sent.len(), 3);
    }
}
