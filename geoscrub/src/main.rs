use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ntex::web::{self, middleware, App, HttpRequest, HttpResponse};
use ntex_cors::Cors;
use ntex_files as fs;
use serde::{Deserialize, Serialize};

use geoscrub_core::{
    scrub::{NormField, ScrubOptions},
    storage::Storage,
    CountryRecord, Engine, PlaceRecord,
};

// openapi3
use oaph::{
    schemars::{self, JsonSchema},
    OpenApiPlaceHolder,
};

mod settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScrubQuery {
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    /// include the full candidate set, not only the winner
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CountryInfoQuery {
    /// ISO2, ISO3 or a country name in any indexed language
    token: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindCitiesQuery {
    name: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NormQuery {
    /// one of `country`, `admin1`, `admin2`
    field: String,
    /// ISO2 country code to scope the lookup
    country: Option<String>,
    value: String,
}

#[derive(Serialize, JsonSchema)]
pub struct PlaceItem<'a> {
    gid: u64,
    name: &'a str,
    country_code: &'a str,
    admin1: Option<&'a str>,
    admin2: Option<&'a str>,
    latitude: f64,
    longitude: f64,
    population: u64,
    feature_code: &'a str,
}

impl<'a> PlaceItem<'a> {
    pub fn from_place(item: &'a PlaceRecord) -> Self {
        PlaceItem {
            gid: item.gid,
            name: &item.name,
            country_code: &item.country_code,
            admin1: item.admin1.as_deref(),
            admin2: item.admin2.as_deref(),
            latitude: item.latitude,
            longitude: item.longitude,
            population: item.population,
            feature_code: &item.feature_code,
        }
    }
}

#[derive(Serialize, JsonSchema)]
pub struct CountryItem<'a> {
    gid: u64,
    iso: &'a str,
    iso3: &'a str,
    name: &'a str,
    population: u64,
}

impl<'a> CountryItem<'a> {
    pub fn from_country(item: &'a CountryRecord) -> Self {
        CountryItem {
            gid: item.gid,
            iso: &item.iso,
            iso3: &item.iso3,
            name: &item.name,
            population: item.population,
        }
    }
}

#[derive(Serialize, JsonSchema)]
pub struct ScrubResultItem<'a> {
    city: Option<PlaceItem<'a>>,
    state: Option<PlaceItem<'a>>,
    country: Option<CountryItem<'a>>,
}

#[derive(Serialize, JsonSchema)]
pub struct ScrubResponse<'a> {
    result: Option<ScrubResultItem<'a>>,
    score: f32,
    /// O original, M modified, D derived
    cc_status: Option<&'static str>,
    /// O original, M modified, D derived
    st_status: Option<&'static str>,
    count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    candidates: Vec<PlaceItem<'a>>,
    /// elapsed time in ms
    time: usize,
}

#[derive(Serialize, JsonSchema)]
pub struct CountryInfoResponse<'a> {
    country: Option<CountryItem<'a>>,
    /// elapsed time in ms
    time: usize,
}

#[derive(Serialize, JsonSchema)]
pub struct FindCitiesResponse<'a> {
    items: Vec<PlaceItem<'a>>,
    /// elapsed time in ms
    time: usize,
}

#[derive(Serialize, JsonSchema)]
pub struct NormResponse<'a> {
    value: Option<&'a str>,
    /// elapsed time in ms
    time: usize,
}

pub async fn scrub(
    engine: web::types::State<Arc<Engine>>,
    web::types::Query(query): web::types::Query<ScrubQuery>,
    _req: HttpRequest,
) -> HttpResponse {
    let now = Instant::now();

    let scrubbed = engine.csc_scrub(
        query.city.as_deref(),
        query.state.as_deref(),
        query.country.as_deref(),
        &ScrubOptions {
            verbose: query.verbose.unwrap_or(false),
        },
    );

    HttpResponse::Ok().json(&ScrubResponse {
        result: scrubbed.result.as_ref().map(|place| ScrubResultItem {
            city: place.city.map(PlaceItem::from_place),
            state: place.state.map(PlaceItem::from_place),
            country: place.country.map(CountryItem::from_country),
        }),
        score: scrubbed.score,
        cc_status: scrubbed.cc_status.map(|s| s.code()),
        st_status: scrubbed.st_status.map(|s| s.code()),
        count: scrubbed.count,
        candidates: scrubbed
            .candidates
            .iter()
            .copied()
            .map(PlaceItem::from_place)
            .collect(),
        time: now.elapsed().as_millis() as usize,
    })
}

pub async fn country_info(
    engine: web::types::State<Arc<Engine>>,
    web::types::Query(query): web::types::Query<CountryInfoQuery>,
    _req: HttpRequest,
) -> HttpResponse {
    let now = Instant::now();

    let country = engine.country_info(&query.token).map(CountryItem::from_country);

    HttpResponse::Ok().json(&CountryInfoResponse {
        country,
        time: now.elapsed().as_millis() as usize,
    })
}

pub async fn find_cities(
    engine: web::types::State<Arc<Engine>>,
    web::types::Query(query): web::types::Query<FindCitiesQuery>,
    _req: HttpRequest,
) -> HttpResponse {
    let now = Instant::now();

    let items = engine
        .find_cities(&query.name)
        .into_iter()
        .take(query.limit.unwrap_or(10))
        .map(PlaceItem::from_place)
        .collect::<Vec<_>>();

    HttpResponse::Ok().json(&FindCitiesResponse {
        items,
        time: now.elapsed().as_millis() as usize,
    })
}

pub async fn norm(
    engine: web::types::State<Arc<Engine>>,
    web::types::Query(query): web::types::Query<NormQuery>,
    _req: HttpRequest,
) -> HttpResponse {
    let now = Instant::now();

    let field = match query.field.as_str() {
        "country" => NormField::Country,
        "admin1" => NormField::Admin1,
        "admin2" => NormField::Admin2,
        other => {
            return HttpResponse::BadRequest()
                .body(format!("Unknown field {other:?}, expected country/admin1/admin2"))
        }
    };

    let value = engine.norm(field, query.country.as_deref(), &query.value);

    HttpResponse::Ok().json(&NormResponse {
        value,
        time: now.elapsed().as_millis() as usize,
    })
}

fn generate_openapi_files(settings: &settings::Settings) -> Result<(), Box<dyn std::error::Error>> {
    let openapi3_yaml_path = std::env::temp_dir().join("openapi3.yaml");

    // render openapi3 yaml to temporary file
    OpenApiPlaceHolder::new()
        .substitute("version", VERSION)
        .substitute("url_path_prefix", &settings.url_path_prefix)
        .query_params::<ScrubQuery>("ScrubQuery")?
        .query_params::<CountryInfoQuery>("CountryInfoQuery")?
        .query_params::<FindCitiesQuery>("FindCitiesQuery")?
        .query_params::<NormQuery>("NormQuery")?
        .schema::<ScrubResponse>("ScrubResponse")?
        .schema::<CountryInfoResponse>("CountryInfoResponse")?
        .schema::<FindCitiesResponse>("FindCitiesResponse")?
        .schema::<NormResponse>("NormResponse")?
        .render_to_file(include_str!("openapi3.yaml"), &openapi3_yaml_path)?;

    #[cfg(feature = "tracing")]
    tracing::info!("openapi3 file: {:?}", openapi3_yaml_path.to_str());

    let title = format!("geoscrub v{}", VERSION);

    let openapi3_url_path = std::path::Path::new(&settings.url_path_prefix).join("openapi3.yaml");
    let openapi3_url_path = openapi3_url_path
        .to_str()
        .ok_or("Failed to build openapi3 url")?;

    // render swagger ui html to temporary file
    OpenApiPlaceHolder::swagger_ui_html_to_file(
        openapi3_url_path,
        &title,
        std::env::temp_dir().join("swagger-ui.html"),
    )?;

    // render redoc ui html to temporary file
    OpenApiPlaceHolder::redoc_ui_html_to_file(
        openapi3_url_path,
        &title,
        std::env::temp_dir().join("redoc-ui.html"),
    )?;

    Ok(())
}

#[ntex::main]
async fn main() -> std::io::Result<()> {
    // logging
    #[cfg(feature = "tracing")]
    {
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            ))
            .with(tracing_subscriber::fmt::layer());
        subscriber.init();
    }

    let settings = settings::Settings::new().expect("On read settings");
    #[cfg(feature = "tracing")]
    tracing::info!("Settings are:\n{:#?}", settings);

    // generate files for openapi3.yaml and swagger ui
    generate_openapi_files(&settings).expect("On generate openapi3 files");

    if settings.index_file.is_empty() {
        panic!("Please set `index_file`");
    }

    let storage = Storage::new();

    let engine = storage
        .load_from(&settings.index_file)
        .unwrap_or_else(|e| panic!("On load engine from file: {} - {}", settings.index_file, e));

    let shared_engine = Arc::new(engine);
    let shared_engine_clone = shared_engine.clone();

    let settings_clone = settings.clone();

    let listen_on = format!("{}:{}", settings.host, settings.port);
    #[cfg(feature = "tracing")]
    tracing::info!("Listen on {}", listen_on);

    web::server(move || {
        let shared_engine = shared_engine_clone.clone();
        let settings = settings_clone.clone();

        App::new()
            .state(shared_engine)
            // enable logger
            .wrap(middleware::Logger::default())
            .wrap(Cors::default())
            .service(
                web::scope(&settings.url_path_prefix)
                    .service((
                        // api
                        web::resource("/api/scrub").to(scrub),
                        web::resource("/api/country/info").to(country_info),
                        web::resource("/api/city/find").to(find_cities),
                        web::resource("/api/norm").to(norm),
                        // serve openapi3 yaml and ui from files
                        fs::Files::new("/openapi3.yaml", std::env::temp_dir())
                            .index_file("openapi3.yaml"),
                        fs::Files::new("/swagger", std::env::temp_dir())
                            .index_file("swagger-ui.html"),
                        fs::Files::new("/redoc", std::env::temp_dir()).index_file("redoc-ui.html"),
                    ))
                    .configure(move |cfg: &mut web::ServiceConfig| {
                        if let Some(static_dir) = settings.static_dir.as_ref() {
                            cfg.service(fs::Files::new("/", static_dir).index_file("index.html"));
                        }
                    }),
            )
    })
    .bind(listen_on)?
    .run()
    .await
}

#[cfg(test)]
mod tests;
