use geoscrub_core::{CountryPatch, Engine, SourceFileOptions};
use ntex::web::{test, App, Error, ServiceConfig};
use ntex::Service;
use ntex::{http, web};

use std::sync::Arc;

fn app_config(cfg: &mut ServiceConfig) {
    let engine = Arc::new(
        Engine::new_from_files(
            SourceFileOptions {
                geonames: "../geoscrub-core/tests/misc/geonames.txt",
                countries: "../geoscrub-core/tests/misc/countryInfo.txt",
                alternate_names: Some("../geoscrub-core/tests/misc/alternateNames.txt"),
                postcodes: None,
                filter_languages: vec![],
            },
            &CountryPatch::builtin(),
        )
        .unwrap(),
    );
    cfg.state(engine).service((
        web::resource("/scrub").to(super::scrub),
        web::resource("/country/info").to(super::country_info),
        web::resource("/city/find").to(super::find_cities),
        web::resource("/norm").to(super::norm),
    ));
}

#[ntex::test]
async fn api_scrub() -> Result<(), Error> {
    let app = test::init_service(App::new().configure(app_config)).await;

    let req = test::TestRequest::get()
        .uri("/scrub?city=Sydney&state=NSW&country=GB")
        .to_request();
    let resp = app.call(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);

    let bytes = test::read_body(resp).await;

    let result: serde_json::Value = serde_json::from_slice(bytes.as_ref())?;
    assert_eq!(result.get("cc_status").unwrap().as_str().unwrap(), "M");
    assert_eq!(result.get("st_status").unwrap().as_str().unwrap(), "O");
    let city = result
        .get("result")
        .unwrap()
        .get("city")
        .unwrap()
        .as_object()
        .unwrap();
    assert_eq!(city.get("name").unwrap().as_str().unwrap(), "Sydney");
    assert_eq!(city.get("country_code").unwrap().as_str().unwrap(), "AU");

    Ok(())
}

#[ntex::test]
async fn api_scrub_no_match() -> Result<(), Error> {
    let app = test::init_service(App::new().configure(app_config)).await;

    let req = test::TestRequest::get()
        .uri("/scrub?city=Foobar&state=XZ&country=ZZ")
        .to_request();
    let resp = app.call(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);

    let bytes = test::read_body(resp).await;

    let result: serde_json::Value = serde_json::from_slice(bytes.as_ref())?;
    assert!(result.get("result").unwrap().is_null());
    assert_eq!(result.get("count").unwrap().as_u64().unwrap(), 0);

    Ok(())
}

#[ntex::test]
async fn api_country_info() -> Result<(), Error> {
    let app = test::init_service(App::new().configure(app_config)).await;

    let req = test::TestRequest::get()
        .uri("/country/info?token=AUS")
        .to_request();
    let resp = app.call(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);

    let bytes = test::read_body(resp).await;

    let result: serde_json::Value = serde_json::from_slice(bytes.as_ref())?;
    let country = result.get("country").unwrap().as_object().unwrap();
    assert_eq!(country.get("iso").unwrap().as_str().unwrap(), "AU");
    assert_eq!(country.get("name").unwrap().as_str().unwrap(), "Australia");

    Ok(())
}

#[ntex::test]
async fn api_find_cities() -> Result<(), Error> {
    let app = test::init_service(App::new().configure(app_config)).await;

    let req = test::TestRequest::get()
        .uri("/city/find?name=sydney&limit=1")
        .to_request();
    let resp = app.call(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);

    let bytes = test::read_body(resp).await;

    let result: serde_json::Value = serde_json::from_slice(bytes.as_ref())?;
    let items = result.get("items").unwrap().as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("gid").unwrap().as_u64().unwrap(), 2147714);

    Ok(())
}

#[ntex::test]
async fn api_norm() -> Result<(), Error> {
    let app = test::init_service(App::new().configure(app_config)).await;

    let req = test::TestRequest::get()
        .uri("/norm?field=admin1&country=US&value=CA")
        .to_request();
    let resp = app.call(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);

    let bytes = test::read_body(resp).await;

    let result: serde_json::Value = serde_json::from_slice(bytes.as_ref())?;
    assert_eq!(result.get("value").unwrap().as_str().unwrap(), "California");

    let req = test::TestRequest::get()
        .uri("/norm?field=bogus&value=CA")
        .to_request();
    let resp = app.call(req).await.unwrap();
    assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);

    Ok(())
}
