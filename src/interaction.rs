//! Click-to-focus zoom behaviour.
//!
//! The controller owns the whole view state (which region is focused, the
//! label shown for it and the zoom animation) and talks to the drawing
//! surface only through [`Renderer`], so it runs the same against the SVG
//! scene and against a recording renderer in tests.

use crate::config::InteractionConfig;
use crate::path::num;
use crate::render::{Label, Renderer};
use crate::types::RegionId;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum InteractionError {
    #[error("no region with id {0:?}")]
    UnknownRegion(RegionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "region", rename_all = "snake_case")]
pub enum FocusState {
    #[default]
    Unfocused,
    FocusedOn(RegionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl ZoomTransform {
    pub const IDENTITY: Self = Self { translate_x: 0.0, translate_y: 0.0, scale: 1.0 };

    /// Scale by `k` around `point` and move it to `center`.
    pub fn focus(center: (f64, f64), point: (f64, f64), k: f64) -> Self {
        Self {
            translate_x: center.0 - k * point.0,
            translate_y: center.1 - k * point.1,
            scale: k,
        }
    }

    pub fn lerp(&self, to: &Self, t: f64) -> Self {
        Self {
            translate_x: self.translate_x + (to.translate_x - self.translate_x) * t,
            translate_y: self.translate_y + (to.translate_y - self.translate_y) * t,
            scale: self.scale + (to.scale - self.scale) * t,
        }
    }

    /// SVG `transform` attribute value.
    pub fn to_svg(&self) -> String {
        format!(
            "translate({},{})scale({})",
            num(self.translate_x),
            num(self.translate_y),
            num(self.scale)
        )
    }
}

/// A time-interpolated move between two transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomTransition {
    pub from: ZoomTransform,
    pub to: ZoomTransform,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl ZoomTransition {
    pub fn settled(at: ZoomTransform) -> Self {
        Self { from: at, to: at, start_ms: 0.0, duration_ms: 0.0 }
    }

    pub fn value_at(&self, now_ms: f64) -> ZoomTransform {
        if self.duration_ms <= 0.0 {
            return self.to;
        }
        let t = ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0);
        self.from.lerp(&self.to, cubic_in_out(t))
    }

    pub fn is_done(&self, now_ms: f64) -> bool {
        now_ms - self.start_ms >= self.duration_ms
    }
}

fn cubic_in_out(t: f64) -> f64 {
    let t = t * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

/// Per-region data the controller needs: where to zoom and what to call it.
#[derive(Debug, Clone)]
pub struct FocusTarget {
    pub name: String,
    pub centroid: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewState {
    pub focus: FocusState,
    pub label: Option<Label>,
    pub transition: ZoomTransition,
    pub stroke_width: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            focus: FocusState::Unfocused,
            label: None,
            transition: ZoomTransition::settled(ZoomTransform::IDENTITY),
            stroke_width: 1.0,
        }
    }
}

pub struct InteractionController {
    targets: Vec<FocusTarget>,
    center: (f64, f64),
    focus_scale: f64,
    duration_ms: f64,
    state: ViewState,
}

impl InteractionController {
    pub fn new(targets: Vec<FocusTarget>, width: f64, height: f64, config: &InteractionConfig) -> Self {
        Self {
            targets,
            center: (width / 2.0, height / 2.0),
            focus_scale: config.focus_scale,
            duration_ms: config.transition_ms,
            state: ViewState::default(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn focus(&self) -> FocusState {
        self.state.focus
    }

    /// Region shape clicked: focus it, or unfocus if it already is.
    pub fn click_region<R: Renderer>(
        &mut self,
        id: RegionId,
        now_ms: f64,
        renderer: &mut R,
    ) -> Result<FocusState, InteractionError> {
        let target = self.targets.get(id.0).ok_or(InteractionError::UnknownRegion(id))?;

        renderer.remove_text();
        self.state.label = None;

        if self.state.focus == FocusState::FocusedOn(id) {
            // Stroke width follows the unzoomed scale here: focus_scale / 1.
            self.reset(self.focus_scale, now_ms, renderer);
            return Ok(self.state.focus);
        }

        let centroid = target.centroid.unwrap_or(self.center);
        let label = Label {
            text: target.name.clone(),
            x: centroid.0,
            y: centroid.1,
            region: id,
        };
        renderer.draw_text(&label);
        self.state.label = Some(label);
        self.state.focus = FocusState::FocusedOn(id);
        debug!(region = id.0, name = %target.name, "focus region");

        self.mark_active(Some(id), renderer);
        let k = self.focus_scale;
        self.animate_to(ZoomTransform::focus(self.center, centroid, k), self.focus_scale / k, now_ms, renderer);
        Ok(self.state.focus)
    }

    /// Focus label clicked: always return to the full map.
    pub fn click_label<R: Renderer>(&mut self, now_ms: f64, renderer: &mut R) -> FocusState {
        renderer.remove_text();
        self.state.label = None;
        self.reset(1.0, now_ms, renderer);
        self.state.focus
    }

    fn reset<R: Renderer>(&mut self, stroke_width: f64, now_ms: f64, renderer: &mut R) {
        debug!("unfocus");
        self.state.focus = FocusState::Unfocused;
        self.mark_active(None, renderer);
        self.animate_to(ZoomTransform::IDENTITY, stroke_width, now_ms, renderer);
    }

    fn mark_active<R: Renderer>(&self, active: Option<RegionId>, renderer: &mut R) {
        for i in 0..self.targets.len() {
            let id = RegionId(i);
            renderer.set_class(id, "active", Some(id) == active);
        }
    }

    fn animate_to<R: Renderer>(
        &mut self,
        to: ZoomTransform,
        stroke_width: f64,
        now_ms: f64,
        renderer: &mut R,
    ) {
        // Start from wherever a running animation currently is.
        let from = self.state.transition.value_at(now_ms);
        self.state.transition = ZoomTransition {
            from,
            to,
            start_ms: now_ms,
            duration_ms: self.duration_ms,
        };
        self.state.stroke_width = stroke_width;
        renderer.set_transform(&self.state.transition, self.state.stroke_width);
    }
}
