//! OpenAPI Specification Generator Binary
//!
//! Prints the Roster OpenAPI specification as JSON to stdout.
//!
//! Usage:
//!   cargo run -p roster-api --bin generate-openapi > openapi.json

use roster_api::ApiDoc;

fn main() {
    match ApiDoc::to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI spec: {}", e);
            std::process::exit(1);
        }
    }
}
