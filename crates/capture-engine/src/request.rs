//! Capture request templates.

use serde::{Deserialize, Serialize};
use vidcap_common::error::{VidcapError, VidcapResult};

use crate::sink::{CaptureSink, SinkKind};

/// Tuning preset the hardware applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTemplate {
    Preview,
    Record,
}

/// 3A control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Off,
    Auto,
}

/// Immutable description of what a repeating request captures and where
/// the frames go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequestSpec {
    template: CaptureTemplate,
    control_mode: ControlMode,
    targets: Vec<CaptureSink>,
}

impl CaptureRequestSpec {
    pub fn builder(template: CaptureTemplate) -> CaptureRequestBuilder {
        CaptureRequestBuilder::new(template)
    }

    pub fn template(&self) -> CaptureTemplate {
        self.template
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn targets(&self) -> &[CaptureSink] {
        &self.targets
    }

    pub fn target_kinds(&self) -> Vec<SinkKind> {
        self.targets.iter().map(|sink| sink.kind).collect()
    }

    pub fn targets_kind(&self, kind: SinkKind) -> bool {
        self.targets.iter().any(|sink| sink.kind == kind)
    }
}

/// Builder for [`CaptureRequestSpec`].
#[derive(Debug, Clone)]
pub struct CaptureRequestBuilder {
    template: CaptureTemplate,
    control_mode: ControlMode,
    targets: Vec<CaptureSink>,
}

impl CaptureRequestBuilder {
    pub fn new(template: CaptureTemplate) -> Self {
        Self {
            template,
            control_mode: ControlMode::Auto,
            targets: Vec::new(),
        }
    }

    pub fn control_mode(mut self, mode: ControlMode) -> Self {
        self.control_mode = mode;
        self
    }

    /// Add a target. A surface already targeted is not added twice.
    pub fn add_target(mut self, sink: CaptureSink) -> Self {
        if !self.targets.iter().any(|t| t.surface.id == sink.surface.id) {
            self.targets.push(sink);
        }
        self
    }

    pub fn targets(self, sinks: impl IntoIterator<Item = CaptureSink>) -> Self {
        sinks.into_iter().fold(self, |b, sink| b.add_target(sink))
    }

    pub fn build(self) -> VidcapResult<CaptureRequestSpec> {
        if self.targets.is_empty() {
            return Err(VidcapError::invalid_state(
                "capture request needs at least one target",
            ));
        }
        Ok(CaptureRequestSpec {
            template: self.template,
            control_mode: self.control_mode,
            targets: self.targets,
        })
    }
}
