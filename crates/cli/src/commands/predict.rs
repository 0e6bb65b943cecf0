//! Price prediction command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PredictRequest};
use crate::output::{format_price, print_json, print_success, OutputFormat};

/// Row for the prediction table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Type")]
    type_local: String,
    #[tabled(rename = "Surface")]
    surface: String,
    #[tabled(rename = "Rooms")]
    pieces: u32,
    #[tabled(rename = "Estimate")]
    estimate: String,
    #[tabled(rename = "Model")]
    model: String,
}

/// Request an estimate and print it
pub async fn predict(
    client: &ApiClient,
    city: &str,
    request: PredictRequest,
    format: OutputFormat,
) -> Result<()> {
    let result = client.predict(city, &request).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Estimated {} for {}",
                format_price(result.prix_m2_estime).bold(),
                result.ville_modele.cyan()
            ));

            let rows = vec![PredictionRow {
                city: result.ville_modele.clone(),
                type_local: request.type_local.clone(),
                surface: format!("{} m²", request.surface_bati),
                pieces: request.nombre_pieces,
                estimate: format_price(result.prix_m2_estime),
                model: result.model.clone(),
            }];
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!(
                "Total estimate: {}",
                format!("{:.0} €", result.prix_m2_estime * request.surface_bati).bold()
            );
        }
    }

    Ok(())
}
