use crate::config::AppConfig;
use crate::interaction::{InteractionController, InteractionError, ViewState};
use crate::path::PathRenderer;
use crate::projection::Projection;
use crate::render::{draw_map, MapLayers, SvgRenderer};
use crate::scale::ColorScale;
use crate::tooltip::Tooltip;
use crate::types::{Dataset, RegionId};
use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Wrapper for RTree indexing
struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Mutable view: the scene plus the state driven by pointer events.
pub struct ViewSession {
    pub controller: InteractionController,
    pub scene: SvgRenderer,
    pub tooltip: Tooltip,
    started: Instant,
}

impl ViewSession {
    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

pub struct AppState {
    pub dataset: Dataset,
    pub layers: MapLayers,
    pub config: AppConfig,
    projected: Vec<MultiPolygon<f64>>,
    tree: RTree<AreaIndex>,
    pub view: Mutex<ViewSession>,
}

impl AppState {
    pub fn new(config: AppConfig, dataset: Dataset) -> Result<Self> {
        let bounds = dataset.bounds().ok_or_else(|| anyhow!("Dataset has no geometry"))?;
        let projection = Projection::fit(bounds, config.canvas.width, config.canvas.height)
            .context("Failed to fit projection to dataset bounds")?;
        info!("Fitted projection scale {:.1}", projection.scale());

        let scale = ColorScale::new(config.scale.domain, config.scale.palette.clone())?;
        let layers = MapLayers::build(&config, &dataset, &projection, &scale)?;

        // Build Spatial Index over canvas-space shapes
        let path = PathRenderer::new(&projection);
        let projected: Vec<MultiPolygon<f64>> =
            dataset.regions.iter().map(|r| path.project_geometry(&r.geometry)).collect();
        let tree_items: Vec<AreaIndex> = projected
            .iter()
            .enumerate()
            .filter_map(|(i, shape)| {
                let rect = shape.bounding_rect()?;
                Some(AreaIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        let tree = RTree::bulk_load(tree_items);

        let mut scene = SvgRenderer::default();
        draw_map(&mut scene, config.canvas.width, config.canvas.height, &layers);

        let controller = InteractionController::new(
            layers.focus_targets(),
            config.canvas.width,
            config.canvas.height,
            &config.interaction,
        );
        let tooltip = Tooltip::new(config.interaction.tooltip_offset);

        Ok(Self {
            dataset,
            layers,
            projected,
            tree,
            view: Mutex::new(ViewSession { controller, scene, tooltip, started: Instant::now() }),
            config,
        })
    }

    /// Region under a canvas-space point, if any.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<RegionId> {
        let point = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .find(|candidate| self.projected[candidate.index].contains(&point))
            .map(|candidate| RegionId(candidate.index))
    }

    fn summary(&self, id: RegionId) -> Option<RegionSummary> {
        let region = self.dataset.get(id)?;
        let shape = self.layers.regions.get(id.0)?;
        Some(RegionSummary {
            id,
            name: region.display_name().to_string(),
            population: region.population_in(&self.config.input.year),
            fill: shape.fill.clone(),
        })
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct RegionSummary {
    id: RegionId,
    name: String,
    population: Option<u64>,
    fill: String,
}

#[derive(Deserialize)]
pub struct QueryParams {
    x: f64,
    y: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PointerEvent {
    Enter,
    Move { region: usize, page_x: f64, page_y: f64 },
    Leave,
}

#[derive(Serialize)]
pub struct TooltipResponse {
    visible: bool,
    html: String,
    left: f64,
    top: f64,
}

impl From<&Tooltip> for TooltipResponse {
    fn from(t: &Tooltip) -> Self {
        Self { visible: t.visible, html: t.html(), left: t.left, top: t.top }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new(&state.config.server.static_dir);
    Router::new()
        .route("/map.svg", get(map_handler))
        .route("/api/regions", get(regions_handler))
        .route("/api/query", get(query_handler))
        .route("/api/click/{id}", post(click_handler))
        .route("/api/label", post(label_handler))
        .route("/api/pointer", post(pointer_handler))
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Dataset) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, dataset)?);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn map_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = state.view.lock().await;
    ([(header::CONTENT_TYPE, "image/svg+xml")], view.scene.to_svg_at(view.now_ms()))
}

async fn regions_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RegionSummary>> {
    Json(state.dataset.iter().filter_map(|(id, _)| state.summary(id)).collect())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<RegionSummary>> {
    Json(state.hit_test(params.x, params.y).and_then(|id| state.summary(id)))
}

async fn click_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<usize>,
) -> Result<Json<ViewState>, StatusCode> {
    let mut view = state.view.lock().await;
    let now = view.now_ms();
    let ViewSession { controller, scene, .. } = &mut *view;
    match controller.click_region(RegionId(id), now, scene) {
        Ok(_) => Ok(Json(controller.state().clone())),
        Err(InteractionError::UnknownRegion(_)) => Err(StatusCode::NOT_FOUND),
    }
}

async fn label_handler(State(state): State<Arc<AppState>>) -> Json<ViewState> {
    let mut view = state.view.lock().await;
    let now = view.now_ms();
    let ViewSession { controller, scene, .. } = &mut *view;
    controller.click_label(now, scene);
    Json(controller.state().clone())
}

async fn pointer_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PointerEvent>,
) -> Result<Json<TooltipResponse>, StatusCode> {
    let mut view = state.view.lock().await;
    match event {
        PointerEvent::Enter => view.tooltip.enter(),
        PointerEvent::Move { region, page_x, page_y } => {
            let region = state.dataset.get(RegionId(region)).ok_or(StatusCode::NOT_FOUND)?;
            view.tooltip.move_to(region, &state.config.input.year, page_x, page_y);
        }
        PointerEvent::Leave => view.tooltip.leave(),
    }
    Ok(Json(TooltipResponse::from(&view.tooltip)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::two_states;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let config = AppConfig::from_toml("[input]\ngeojson = \"unused.json\"\n").unwrap();
        Arc::new(AppState::new(config, two_states()).unwrap())
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn hit_test_finds_region_under_centroid() {
        let state = state();
        for shape in &state.layers.regions {
            let (x, y) = shape.centroid.unwrap();
            assert_eq!(state.hit_test(x, y), Some(shape.id));
        }
        assert_eq!(state.hit_test(-10.0, -10.0), None);
    }

    #[tokio::test]
    async fn click_then_label_round_trip() {
        let state = state();

        let (status, body) = send(&state, "POST", "/api/click/0", None).await;
        assert_eq!(status, StatusCode::OK);
        let view: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["focus"]["state"], "focused_on");
        assert_eq!(view["focus"]["region"], 0);
        assert_eq!(view["label"]["text"], "Bavaria");
        assert_eq!(view["transition"]["to"]["scale"], 1.75);

        let (_, svg) = send(&state, "GET", "/map.svg", None).await;
        assert!(svg.contains("Bavaria</text>"));

        let (status, body) = send(&state, "POST", "/api/label", None).await;
        assert_eq!(status, StatusCode::OK);
        let view: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["focus"]["state"], "unfocused");
        assert!(view["label"].is_null());
    }

    #[tokio::test]
    async fn click_returns_transition_for_the_page_to_animate() {
        let state = state();

        let (_, body) = send(&state, "POST", "/api/click/1", None).await;
        let view: serde_json::Value = serde_json::from_str(&body).unwrap();
        let transition = &view["transition"];
        assert_eq!(transition["from"]["scale"], 1.0);
        assert_eq!(transition["to"]["scale"], 1.75);
        assert_eq!(transition["duration_ms"], 1000.0);
        assert_eq!(view["stroke_width"], 1.0);

        // Fetched right away, the map still shows the zoom near its start.
        let (_, svg) = send(&state, "GET", "/map.svg", None).await;
        assert!(!svg.contains("scale(1.75)"));

        // Re-clicking the focused region zooms back out with the wider stroke.
        let (_, body) = send(&state, "POST", "/api/click/1", None).await;
        let view: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["focus"]["state"], "unfocused");
        assert_eq!(view["transition"]["to"]["scale"], 1.0);
        assert_eq!(view["stroke_width"], 1.75);
    }

    #[tokio::test]
    async fn unknown_region_click_is_not_found() {
        let state = state();
        let (status, _) = send(&state, "POST", "/api/click/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pointer_events_drive_tooltip() {
        let state = state();

        let (_, body) = send(&state, "POST", "/api/pointer", Some(r#"{"kind":"enter"}"#)).await;
        let tip: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tip["visible"], true);

        let (_, body) = send(
            &state,
            "POST",
            "/api/pointer",
            Some(r#"{"kind":"move","region":1,"page_x":100,"page_y":40}"#),
        )
        .await;
        let tip: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tip["html"], "Federal state: Hessen <br>\nPopulation: 6,391,360");
        assert_eq!(tip["left"], 120.0);
        assert_eq!(tip["top"], 40.0);

        let (_, body) = send(&state, "POST", "/api/pointer", Some(r#"{"kind":"leave"}"#)).await;
        let tip: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tip["visible"], false);
    }

    #[tokio::test]
    async fn crossing_a_border_ends_visible() {
        let state = state();
        let events = [
            r#"{"kind":"enter"}"#,
            r#"{"kind":"move","region":0,"page_x":10,"page_y":10}"#,
            r#"{"kind":"leave"}"#,
            r#"{"kind":"enter"}"#,
            r#"{"kind":"move","region":1,"page_x":12,"page_y":10}"#,
        ];
        let mut last = serde_json::Value::Null;
        for event in events {
            let (status, body) = send(&state, "POST", "/api/pointer", Some(event)).await;
            assert_eq!(status, StatusCode::OK);
            last = serde_json::from_str(&body).unwrap();
        }
        assert_eq!(last["visible"], true);
        assert_eq!(last["html"], "Federal state: Hessen <br>\nPopulation: 6,391,360");
    }

    #[tokio::test]
    async fn move_after_leave_stays_hidden() {
        let state = state();
        send(&state, "POST", "/api/pointer", Some(r#"{"kind":"enter"}"#)).await;
        send(&state, "POST", "/api/pointer", Some(r#"{"kind":"leave"}"#)).await;
        let (_, body) = send(
            &state,
            "POST",
            "/api/pointer",
            Some(r#"{"kind":"move","region":0,"page_x":5,"page_y":5}"#),
        )
        .await;
        let tip: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tip["visible"], false);
    }

    #[tokio::test]
    async fn query_returns_summary() {
        let state = state();
        let (x, y) = state.layers.regions[1].centroid.unwrap();
        let (status, body) = send(&state, "GET", &format!("/api/query?x={x}&y={y}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let summary: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(summary["name"], "Hessen");
        assert_eq!(summary["population"], 6_391_360);
        assert_eq!(summary["fill"], "#6baed6");
    }
}
