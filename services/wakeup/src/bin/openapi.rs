//! services/wakeup/src/bin/openapi.rs
//!
//! Writes the OpenAPI 3.0 document for the alarm REST API to `openapi.json`.

use utoipa::OpenApi;
use wakeup_lib::web::ApiDoc;

fn generate_spec(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = api_doc.to_pretty_json()?;
    std::fs::write(path, spec_json)?;
    println!("OpenAPI document written to {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    generate_spec(ApiDoc::openapi(), "openapi.json")?;
    Ok(())
}
