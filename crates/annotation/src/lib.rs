//! Annotation records for pipeline output
//!
//! Each processed video document becomes one [`View`]: a metadata annotation
//! stamped with the stream properties, followed by one bounding-box
//! annotation per recognized face. Identifiers come from an
//! [`IdentifierCounter`] that lives for a single emission pass, so two passes
//! over the same input produce the same identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use video_faces_pipeline::PipelineOutput;

/// Time unit declared for bounding-box annotations (`timepoint` is a frame index)
pub const TIME_UNIT_FRAMES: &str = "frames";

const METADATA_PREFIX: &str = "a";
const BOX_PREFIX: &str = "b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationType {
    Annotation,
    BoundingBox,
}

/// Generates `a1, a2, ...`, `b1, b2, ...` per prefix
#[derive(Debug, Default)]
pub struct IdentifierCounter {
    counts: HashMap<String, u64>,
}

impl IdentifierCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &str) -> String {
        let count = self.counts.entry(prefix.to_string()).or_insert(0);
        *count += 1;
        format!("{prefix}{count}")
    }
}

/// Declares an annotation type a view contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contain {
    #[serde(rename = "@type")]
    pub at_type: AnnotationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Properties {
    VideoMetadata {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        document: Option<String>,
        fps: f64,
        width: u32,
        height: u32,
        frame_count: u64,
    },
    Face {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        document: Option<String>,
        timepoint: u64,
        name: String,
        /// `[[x1, y1], [x2, y1], [x1, y2], [x2, y2]]`
        coordinates: [[i32; 2]; 4],
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "@type")]
    pub at_type: AnnotationType,
    pub properties: Properties,
}

impl Annotation {
    #[must_use]
    pub fn id(&self) -> &str {
        match &self.properties {
            Properties::VideoMetadata { id, .. } | Properties::Face { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub contains: Vec<Contain>,
    pub annotations: Vec<Annotation>,
}

/// Build the view for one video document
///
/// `document` is attached to every annotation when given.
pub fn emit(
    output: &PipelineOutput,
    document: Option<&str>,
    counter: &mut IdentifierCounter,
) -> View {
    let document = document.map(str::to_string);

    let contains = vec![
        Contain {
            at_type: AnnotationType::Annotation,
            document: document.clone(),
            time_unit: None,
        },
        Contain {
            at_type: AnnotationType::BoundingBox,
            document: document.clone(),
            time_unit: Some(TIME_UNIT_FRAMES.to_string()),
        },
    ];

    let mut annotations = Vec::with_capacity(1 + output.face_count());
    annotations.push(Annotation {
        at_type: AnnotationType::Annotation,
        properties: Properties::VideoMetadata {
            id: counter.next(METADATA_PREFIX),
            document: document.clone(),
            fps: output.fps,
            width: output.width,
            height: output.height,
            frame_count: output.frame_count,
        },
    });

    for (&timepoint, boxes) in &output.bounding_boxes_per_frame_index {
        for labeled in boxes {
            annotations.push(Annotation {
                at_type: AnnotationType::BoundingBox,
                properties: Properties::Face {
                    id: counter.next(BOX_PREFIX),
                    document: document.clone(),
                    timepoint,
                    name: labeled.label().to_string(),
                    coordinates: labeled.bbox().corners(),
                },
            });
        }
    }

    debug!(
        "Emitted {} annotations for {}",
        annotations.len(),
        output.video_name
    );

    View {
        contains,
        annotations,
    }
}

/// Emit one view per `(document id, output)` pair with a fresh counter
pub fn emit_documents<'a, I>(documents: I) -> Vec<View>
where
    I: IntoIterator<Item = (&'a str, &'a PipelineOutput)>,
{
    let mut counter = IdentifierCounter::new();
    documents
        .into_iter()
        .map(|(document, output)| emit(output, Some(document), &mut counter))
        .collect()
}
