use crate::charts::{ChartRenderer, CHART_COUNT, PANEL};
use crate::config::AppConfig;
use crate::data::RegionCache;
use crate::mobility::MobilityTable;
use crate::page::{viewport_for, Dashboard};
use crate::regions::RegionSet;
use crate::selection::{ClickOutcome, Selection};
use crate::types::LatLng;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;

pub struct AppState {
    pub config: AppConfig,
    pub regions: RegionCache,
    pub charts: ChartRenderer,
    // None until the region dataset has been loaded once
    selection: RwLock<Option<Selection>>,
}

impl AppState {
    pub fn new(config: AppConfig, client: Client) -> Result<Self> {
        Ok(Self {
            regions: RegionCache::new(config.regions.clone(), client),
            charts: ChartRenderer::new(&config.charts)?,
            config,
            selection: RwLock::new(None),
        })
    }

    async fn selection_snapshot(&self, regions: &RegionSet) -> Selection {
        if let Some(current) = self.selection.read().await.as_ref() {
            return current.clone();
        }
        self.selection
            .write()
            .await
            .get_or_insert_with(|| Selection::new(regions))
            .clone()
    }
}

/// Wraps `anyhow::Error` so handlers can use `?`; shown to the user as a 500.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

/// Either map pixels (as reported by the page) or a coordinate. `view` is
/// the province the clicked map was centred on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ClickRequest {
    Pixel {
        x: f64,
        y: f64,
        #[serde(default)]
        view: Option<String>,
    },
    Geo { lat: f64, lng: f64 },
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    #[serde(flatten)]
    outcome: ClickOutcome,
    clicked: LatLng,
    selection: Selection,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    lat: Option<f64>,
    lon: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
    view: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegionHit {
    name: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        .route("/map.svg", get(map_svg))
        .route("/charts/:file", get(chart_svg))
        .route("/api/click", post(click))
        .route("/api/selection", get(current_selection))
        .route("/api/region", get(region_at))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let client = Client::builder().gzip(true).build()?;
    let bind = config.server.bind.clone();
    let state = Arc::new(AppState::new(config, client)?);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Serving dashboard on http://{}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

/// Converts map pixels through the viewport of the page they came from. Falls
/// back to the current selection when `view` is missing or unknown.
fn pixel_to_geo(config: &AppConfig, regions: &RegionSet, view: Option<&str>, current: &str, x: f64, y: f64) -> LatLng {
    let province = view.filter(|name| regions.get(name).is_some()).unwrap_or(current);
    viewport_for(&config.map, regions, province).to_geo(x, y)
}

fn svg_response(svg: String) -> Response {
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

async fn index(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    let regions = state.regions.get_or_load().await?;
    let selection = state.selection_snapshot(&regions).await;

    let dashboard = tokio::task::spawn_blocking({
        let state = state.clone();
        move || Dashboard::render(&state.config, &regions, &state.charts, &selection)
    })
    .await??;

    Ok(Html(dashboard.to_html()))
}

async fn map_svg(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let regions = state.regions.get_or_load().await?;
    let selection = state.selection_snapshot(&regions).await;
    let svg = tokio::task::spawn_blocking({
        let state = state.clone();
        move || {
            let viewport = viewport_for(&state.config.map, &regions, &selection.province);
            crate::map::render_map(&regions, &selection.province, &viewport, selection.last_click)
        }
    })
    .await??;

    Ok(svg_response(svg))
}

async fn chart_svg(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> ApiResult<Response> {
    let index = file
        .strip_suffix(".svg")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=CHART_COUNT).contains(n));
    let Some(index) = index else {
        return Ok((StatusCode::NOT_FOUND, format!("No chart {}", file)).into_response());
    };

    let regions = state.regions.get_or_load().await?;
    let selection = state.selection_snapshot(&regions).await;

    let svg = tokio::task::spawn_blocking({
        let state = state.clone();
        move || -> Result<String> {
            let table = MobilityTable::load(&state.config.mobility.csv)?;
            let rows = table.for_province(&selection.province);
            state.charts.render(&PANEL[index - 1], &selection.province, &rows)
        }
    })
    .await??;

    Ok(svg_response(svg))
}

async fn click(State(state): State<Arc<AppState>>, Json(req): Json<ClickRequest>) -> ApiResult<Json<ClickResponse>> {
    let regions = state.regions.get_or_load().await?;
    let mut guard = state.selection.write().await;
    let selection = guard.get_or_insert_with(|| Selection::new(&regions));

    let clicked = match req {
        ClickRequest::Geo { lat, lng } => LatLng::new(lat, lng),
        ClickRequest::Pixel { x, y, view } => {
            pixel_to_geo(&state.config, &regions, view.as_deref(), &selection.province, x, y)
        }
    };

    let outcome = selection.apply_click(&regions, clicked);
    info!(
        "Click at ({:.5}, {:.5}): {:?}, selected {}",
        clicked.lat, clicked.lng, outcome, selection.province
    );

    Ok(Json(ClickResponse {
        outcome,
        clicked,
        selection: selection.clone(),
    }))
}

async fn current_selection(State(state): State<Arc<AppState>>) -> ApiResult<Json<Selection>> {
    let regions = state.regions.get_or_load().await?;
    Ok(Json(state.selection_snapshot(&regions).await))
}

async fn region_at(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionQuery>,
) -> ApiResult<Response> {
    let regions = state.regions.get_or_load().await?;

    let at = match params {
        RegionQuery { lat: Some(lat), lon: Some(lon), .. } => LatLng::new(lat, lon),
        RegionQuery { x: Some(x), y: Some(y), view, .. } => {
            let selection = state.selection_snapshot(&regions).await;
            pixel_to_geo(&state.config, &regions, view.as_deref(), &selection.province, x, y)
        }
        _ => {
            return Ok((StatusCode::BAD_REQUEST, "Expected lat & lon or x & y").into_response());
        }
    };

    let hit = regions.locate(at).map(|r| RegionHit { name: r.name.clone() });
    Ok(Json(hit).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::{write_fixture, PROVINCES};
    use crate::mobility::tests::MOBILITY_CSV;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(tag: &str) -> Router {
        let mut config = AppConfig::default();
        config.regions.source = write_fixture(&format!("{}.geojson", tag), PROVINCES)
            .to_string_lossy()
            .into_owned();
        config.mobility.csv = write_fixture(&format!("{}.csv", tag), MOBILITY_CSV);
        router(Arc::new(AppState::new(config, Client::new()).unwrap()))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_click(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/click")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app("health");
        assert_eq!(send(&app, get("/health")).await, (StatusCode::OK, "ok".to_string()));
    }

    #[tokio::test]
    async fn selection_starts_on_first_province() {
        let app = app("initial");
        let (status, body) = send(&app, get("/api/selection")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["province"], "Madrid");
        assert!(json["last_click"].is_null());
    }

    #[tokio::test]
    async fn geo_click_switches_and_outside_click_keeps() {
        let app = app("geo-click");

        let (status, body) = send(&app, post_click(r#"{"lat": 39.5, "lng": -2.5}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["outcome"], "changed");
        assert_eq!(json["from"], "Madrid");
        assert_eq!(json["selection"]["province"], "Cuenca");

        let (_, body) = send(&app, post_click(r#"{"lat": 10.0, "lng": 10.0}"#)).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["outcome"], "outside");
        assert_eq!(json["selection"]["province"], "Cuenca");
        assert_eq!(json["selection"]["last_click"]["lat"], 10.0);
    }

    #[tokio::test]
    async fn pixel_click_uses_current_viewport() {
        let app = app("pixel-click");

        // the page shows Madrid first; aim at the middle of Toledo
        let regions = crate::data::parse_geojson(PROVINCES.as_bytes(), "name").unwrap();
        let regions = RegionSet::new(regions).unwrap();
        let viewport = viewport_for(&AppConfig::default().map, &regions, "Madrid");
        let (x, y) = viewport.to_screen(LatLng::new(39.5, -4.5));

        let (status, body) = send(&app, post_click(&format!(r#"{{"x": {}, "y": {}}}"#, x, y))).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["selection"]["province"], "Toledo");
    }

    #[tokio::test]
    async fn repeated_pixel_click_uses_the_drawn_map() {
        let app = app("pixel-twice");

        let regions = crate::data::parse_geojson(PROVINCES.as_bytes(), "name").unwrap();
        let regions = RegionSet::new(regions).unwrap();
        let viewport = viewport_for(&AppConfig::default().map, &regions, "Madrid");
        let (x, y) = viewport.to_screen(LatLng::new(39.5, -4.5));
        let body = format!(r#"{{"x": {}, "y": {}, "view": "Madrid"}}"#, x, y);

        // second click lands before the page is redrawn around Toledo
        let (_, first) = send(&app, post_click(&body)).await;
        let (status, second) = send(&app, post_click(&body)).await;
        assert_eq!(status, StatusCode::OK);

        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(first["outcome"], "changed");
        assert_eq!(first["to"], "Toledo");
        assert_eq!(second["outcome"], "unchanged");
        assert_eq!(second["selection"]["province"], "Toledo");
        assert_eq!(first["clicked"], second["clicked"]);
    }

    #[tokio::test]
    async fn pixel_lookup_follows_view() {
        let app = app("pixel-lookup");
        send(&app, post_click(r#"{"lat": 39.5, "lng": -2.5}"#)).await;

        let regions = crate::data::parse_geojson(PROVINCES.as_bytes(), "name").unwrap();
        let regions = RegionSet::new(regions).unwrap();
        let viewport = viewport_for(&AppConfig::default().map, &regions, "Madrid");
        let (x, y) = viewport.to_screen(LatLng::new(40.5, -3.5));

        let (_, body) = send(&app, get(&format!("/api/region?x={}&y={}&view=Madrid", x, y))).await;
        assert_eq!(body, r#"{"name":"Madrid"}"#);
    }

    #[tokio::test]
    async fn malformed_click_is_rejected() {
        let app = app("bad-click");
        let (status, _) = send(&app, post_click(r#"{"where": "here"}"#)).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn index_renders_map_and_twelve_charts() {
        let app = app("index");
        send(&app, post_click(r#"{"lat": 39.5, "lng": -2.5}"#)).await;

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<span style=\"color:red;\">Cuenca</span>"));
        assert_eq!(body.matches("class=\"chart\"").count(), 12);
    }

    #[tokio::test]
    async fn chart_routes() {
        let app = app("charts");

        let resp = app.clone().oneshot(get("/charts/1.svg")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");

        assert_eq!(send(&app, get("/charts/0.svg")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, get("/charts/13.svg")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, get("/charts/one.svg")).await.0, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, get("/map.svg")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<svg"));
    }

    #[tokio::test]
    async fn region_lookup() {
        let app = app("lookup");

        let (_, body) = send(&app, get("/api/region?lat=40.5&lon=-3.5")).await;
        assert_eq!(body, r#"{"name":"Madrid"}"#);

        let (_, body) = send(&app, get("/api/region?lat=0.5&lon=30.0")).await;
        assert_eq!(body, "null");

        let (status, _) = send(&app, get("/api/region")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_region_source_is_a_server_error() {
        let mut config = AppConfig::default();
        config.regions.source = "/nonexistent/provinces.geojson".to_string();
        let app = router(Arc::new(AppState::new(config, Client::new()).unwrap()));

        let (status, body) = send(&app, get("/api/selection")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Failed to open GeoJSON file"));
    }
}
