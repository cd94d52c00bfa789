//! `identities`: list what a facebank knows

use super::load_facebank;
use crate::settings::Settings;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct IdentitiesCommand {
    /// Facebank JSON file (overrides the config file)
    #[arg(long, value_name = "FILE")]
    facebank: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl IdentitiesCommand {
    pub fn execute(self, settings: &Settings) -> Result<()> {
        let mut settings = settings.clone();
        if let Some(path) = self.facebank {
            settings.models.facebank = path;
        }

        let facebank = load_facebank(&settings)?;
        let identities = facebank.identities();

        if self.json {
            return super::write_json(&identities, None, true);
        }

        let width = identities
            .iter()
            .map(|i| i.name.len())
            .max()
            .unwrap_or(0)
            .max("IDENTITY".len());
        println!("{:<width$}  EMBEDDINGS", "IDENTITY");
        for identity in &identities {
            println!("{:<width$}  {}", identity.name, identity.embeddings);
        }
        println!(
            "\n{} identities, {} embeddings, dimension {}",
            identities.len(),
            facebank.len(),
            facebank.dim().map_or_else(|| "-".to_string(), |d| d.to_string())
        );
        Ok(())
    }
}
