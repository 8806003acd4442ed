//! Gaze classifications consumed by the frame loop
//!
//! Frame capture and landmark detection live outside this crate. A detector
//! process writes one line per frame to our stdin; this module turns those
//! lines into [`FrameInput`]s. Only the LOOKING/AWAY label feeds the focus
//! state machine, pose numbers are diagnostic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pose estimate beyond this many degrees is considered a failed solve
const POSE_FAILURE_DEG: f64 = 90.0;

/// Binary attention label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttentionStatus {
    /// User is looking at the screen
    #[default]
    Looking,
    /// User is looking elsewhere (or no face was found)
    Away,
}

impl AttentionStatus {
    /// Label as sent over the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Looking => "LOOKING",
            Self::Away => "AWAY",
        }
    }

    /// Build from an "is away" flag
    #[must_use]
    pub const fn from_away(away: bool) -> Self {
        if away { Self::Away } else { Self::Looking }
    }

    #[must_use]
    pub const fn is_away(self) -> bool {
        matches!(self, Self::Away)
    }
}

impl fmt::Display for AttentionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame's classification from the external detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub status: AttentionStatus,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default = "default_gaze_ratio")]
    pub gaze_ratio: f64,
}

const fn default_gaze_ratio() -> f64 {
    0.5
}

impl Classification {
    /// Classification carrying only a label
    #[must_use]
    pub const fn label(status: AttentionStatus) -> Self {
        Self {
            status,
            yaw: 0.0,
            pitch: 0.0,
            gaze_ratio: 0.5,
        }
    }
}

/// Head-pose and gaze thresholds for deciding LOOKING vs AWAY
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseThresholds {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub gaze_min: f64,
    pub gaze_max: f64,
}

impl Default for PoseThresholds {
    fn default() -> Self {
        Self {
            yaw_deg: 35.0,
            pitch_deg: 25.0,
            gaze_min: 0.25,
            gaze_max: 0.75,
        }
    }
}

impl PoseThresholds {
    /// Decide the raw label for a pose estimate
    ///
    /// When the pose solve produced extreme angles it is ignored and only
    /// the iris gaze ratio is used.
    #[must_use]
    pub fn classify(&self, yaw: f64, pitch: f64, gaze_ratio: f64) -> AttentionStatus {
        let gaze_centered = (self.gaze_min..=self.gaze_max).contains(&gaze_ratio);

        if yaw.abs() < self.yaw_deg && pitch.abs() < self.pitch_deg && gaze_centered {
            return AttentionStatus::Looking;
        }

        if yaw.abs() > POSE_FAILURE_DEG || pitch.abs() > POSE_FAILURE_DEG {
            return AttentionStatus::from_away(!gaze_centered);
        }

        AttentionStatus::Away
    }
}

/// Where a click came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOrigin {
    /// Local overlay / keyboard
    Local,
    /// A push-channel client
    Remote,
}

/// One unit of work for the frame loop
#[derive(Debug, Clone, PartialEq)]
pub enum FrameInput {
    /// A classified frame
    Frame(Classification),
    /// The detector could not classify this frame
    Unavailable,
    /// Toggle the active gate
    Toggle,
    /// Reset cooldown and clear the bubble
    Reset,
    /// Speak the click line
    Click(ClickOrigin),
    /// Stop the loop
    Quit,
}

/// Pose-only payload (no label): classified with [`PoseThresholds`]
#[derive(Debug, Deserialize)]
struct RawPose {
    #[serde(default)]
    status: Option<AttentionStatus>,
    #[serde(default)]
    yaw: f64,
    #[serde(default)]
    pitch: f64,
    #[serde(default = "default_gaze_ratio")]
    gaze_ratio: f64,
}

/// Parse one line of detector / control input
///
/// Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::InvalidMessage`] for anything unrecognised
pub fn parse_input_line(line: &str, thresholds: &PoseThresholds) -> Result<Option<FrameInput>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.starts_with('{') {
        let raw: RawPose = serde_json::from_str(trimmed)
            .map_err(|e| Error::InvalidMessage(format!("bad classification: {e}")))?;
        let status = raw
            .status
            .unwrap_or_else(|| thresholds.classify(raw.yaw, raw.pitch, raw.gaze_ratio));
        return Ok(Some(FrameInput::Frame(Classification {
            status,
            yaw: raw.yaw,
            pitch: raw.pitch,
            gaze_ratio: raw.gaze_ratio,
        })));
    }

    let input = match trimmed.to_ascii_lowercase().as_str() {
        "looking" | "l" => FrameInput::Frame(Classification::label(AttentionStatus::Looking)),
        "away" | "a" => FrameInput::Frame(Classification::label(AttentionStatus::Away)),
        "unavailable" | "none" => FrameInput::Unavailable,
        "toggle" | "space" => FrameInput::Toggle,
        "reset" | "r" => FrameInput::Reset,
        "click" => FrameInput::Click(ClickOrigin::Local),
        "quit" | "q" => FrameInput::Quit,
        other => {
            return Err(Error::InvalidMessage(format!("unknown input: {other}")));
        }
    };

    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_pose_is_looking() {
        let t = PoseThresholds::default();
        assert_eq!(t.classify(10.0, 5.0, 0.5), AttentionStatus::Looking);
        assert_eq!(t.classify(40.0, 5.0, 0.5), AttentionStatus::Away);
        assert_eq!(t.classify(10.0, 5.0, 0.9), AttentionStatus::Away);
    }

    #[test]
    fn failed_pose_falls_back_to_gaze() {
        let t = PoseThresholds::default();
        assert_eq!(t.classify(120.0, 0.0, 0.5), AttentionStatus::Looking);
        assert_eq!(t.classify(0.0, -95.0, 0.1), AttentionStatus::Away);
    }

    #[test]
    fn parses_labels_and_controls() {
        let t = PoseThresholds::default();
        assert_eq!(
            parse_input_line("AWAY", &t).unwrap(),
            Some(FrameInput::Frame(Classification::label(AttentionStatus::Away)))
        );
        assert_eq!(parse_input_line(" toggle ", &t).unwrap(), Some(FrameInput::Toggle));
        assert_eq!(parse_input_line("none", &t).unwrap(), Some(FrameInput::Unavailable));
        assert_eq!(parse_input_line("", &t).unwrap(), None);
        assert!(parse_input_line("wat", &t).is_err());
    }

    #[test]
    fn parses_json_pose_without_label() {
        let t = PoseThresholds::default();
        let input = parse_input_line(r#"{"yaw": 50.0, "pitch": 0.0, "gaze_ratio": 0.5}"#, &t)
            .unwrap()
            .unwrap();
        let FrameInput::Frame(c) = input else {
            panic!("expected frame");
        };
        assert_eq!(c.status, AttentionStatus::Away);
        assert!((c.yaw - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn explicit_label_wins_over_pose() {
        let t = PoseThresholds::default();
        let input = parse_input_line(r#"{"status":"LOOKING","yaw":80.0}"#, &t)
            .unwrap()
            .unwrap();
        assert!(matches!(
            input,
            FrameInput::Frame(Classification { status: AttentionStatus::Looking, .. })
        ));
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&AttentionStatus::Away).unwrap();
        assert_eq!(json, "\"AWAY\"");
    }
}
