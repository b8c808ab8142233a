// Error types for pitboard

use crate::pipeline::DisplayUpdate;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum PitboardError {
    // Errors for the iRacing client
    #[snafu(display("Timeout waiting for iRacing session"))]
    IRacingConnectionTimeout,
    #[snafu(display("Missing iRacing client, session not initialized"))]
    MissingIRacingSession,
    #[snafu(display("Telemetry source error: {description}"))]
    TelemetrySourceError { description: String },
    #[snafu(display("No telemetry data available this tick"))]
    NoTelemetryData,

    // Errors while pushing updates to the display sink
    #[snafu(display("Error broadcasting display update"))]
    DisplayBroadcastError {
        source: Box<SendError<DisplayUpdate>>,
    },

    // Errors for the LaMetric notification transport
    #[snafu(display("Device settings incomplete, missing IP address or API key"))]
    DeviceNotConfigured,
    #[snafu(display("Error talking to the LaMetric device: {description}"))]
    TransportError { description: String },
    #[snafu(display("Unexpected response from the LaMetric device: {description}"))]
    MalformedDeviceResponse { description: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<SendError<DisplayUpdate>> for PitboardError {
    fn from(value: SendError<DisplayUpdate>) -> Self {
        PitboardError::DisplayBroadcastError {
            source: Box::new(value),
        }
    }
}
