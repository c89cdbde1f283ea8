//! Wire format of the detection socket.
//!
//! Outbound frames are one JSON text message each. Inbound results are
//! validated here, at the boundary, so the overlay only ever holds boxes
//! that passed the schema.

use serde::{Deserialize, Serialize};

use crate::pipeline::error::{ChannelError, Result};

/// Class label painted in the alert colour.
pub const FALL_CLASS: &str = "fall";

/// One detected region in source-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub conf: f64,
    pub cls: String,
}

impl DetectionBox {
    pub fn is_fall(&self) -> bool {
        self.cls == FALL_CLASS
    }

    /// `"<cls> (<conf as percent, one decimal>%)"`.
    pub fn label(&self) -> String {
        format!("{} ({:.1}%)", self.cls, self.conf * 100.0)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(format!("non-finite coordinates in '{}' box", self.cls));
        }
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(format!("confidence {} outside [0, 1]", self.conf));
        }
        Ok(())
    }
}

/// Client → service: one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSubmission {
    #[serde(rename = "elderlyId")]
    pub subject_id: String,
    pub client_id: String,
    /// `data:image/jpeg;base64,...`
    pub frame_b64: String,
}

impl FrameSubmission {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }
}

/// Service → client: detection result for one frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMessage {
    pub boxes: Vec<DetectionBox>,
    #[serde(default)]
    pub falls_in_frame: Option<u32>,
    #[serde(default)]
    pub persons_in_frame: Option<u32>,
}

/// Parse and validate one inbound text message.
pub fn parse_inbound(text: &str) -> Result<DetectionMessage> {
    let message: DetectionMessage =
        serde_json::from_str(text).map_err(|e| ChannelError::Parse(e.to_string()))?;
    for detection in &message.boxes {
        detection.validate().map_err(ChannelError::Parse)?;
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_uses_service_field_names() {
        let submission = FrameSubmission {
            subject_id: "s1".to_string(),
            client_id: "frontend-user-123".to_string(),
            frame_b64: "data:image/jpeg;base64,AAAA".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&submission.to_json().unwrap()).unwrap();
        assert_eq!(json["elderlyId"], "s1");
        assert_eq!(json["client_id"], "frontend-user-123");
        assert_eq!(json["frame_b64"], "data:image/jpeg;base64,AAAA");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn parses_boxes_with_counters() {
        let text = r#"{"boxes":[{"x1":10,"y1":10,"x2":50,"y2":50,"conf":0.91,"cls":"fall"}],
                       "fallsInFrame":1,"personsInFrame":0}"#;
        let message = parse_inbound(text).unwrap();
        assert_eq!(message.boxes.len(), 1);
        assert_eq!(message.boxes[0].x2, 50.0);
        assert!(message.boxes[0].is_fall());
        assert_eq!(message.falls_in_frame, Some(1));
    }

    #[test]
    fn parses_empty_boxes() {
        let message = parse_inbound(r#"{"boxes":[]}"#).unwrap();
        assert!(message.boxes.is_empty());
        assert_eq!(message.persons_in_frame, None);
    }

    #[test]
    fn rejects_message_without_boxes() {
        let err = parse_inbound(r#"{"status":"ok"}"#).unwrap_err();
        assert!(matches!(err, ChannelError::Parse(_)));
    }

    #[test]
    fn rejects_non_json_text() {
        assert!(parse_inbound("hello").is_err());
        assert!(parse_inbound("").is_err());
    }

    #[test]
    fn rejects_box_with_missing_field() {
        let text = r#"{"boxes":[{"x1":1,"y1":1,"x2":2,"conf":0.5,"cls":"person"}]}"#;
        assert!(parse_inbound(text).is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let text = r#"{"boxes":[{"x1":1,"y1":1,"x2":2,"y2":2,"conf":1.5,"cls":"person"}]}"#;
        assert!(parse_inbound(text).is_err());
    }

    #[test]
    fn label_rounds_to_one_decimal_percent() {
        let detection = DetectionBox {
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 50.0,
            conf: 0.91,
            cls: "fall".to_string(),
        };
        assert_eq!(detection.label(), "fall (91.0%)");

        let person = DetectionBox {
            conf: 0.876,
            cls: "person".to_string(),
            ..detection
        };
        assert_eq!(person.label(), "person (87.6%)");
    }
}
