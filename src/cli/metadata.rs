//! CLI commands for listing portal metadata

use clap::Args;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};
use crate::fetcher::PortalHttpClient;
use crate::metadata::{fetch_organizations, DatasetCatalog, DatasetInfo, OrganizationInfo};

/// Datasets subcommand
#[derive(Debug, Args)]
pub struct DatasetsCommand {
    /// Only list datasets of this domain (e.g. raw)
    #[arg(long)]
    pub domain: Option<String>,
}

impl DatasetsCommand {
    /// Fetch the catalog and print it.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let transport = PortalHttpClient::new(&config)?;
        let catalog = DatasetCatalog::fetch(&transport, &config.server).await?;

        let datasets: Vec<&DatasetInfo> = match &self.domain {
            Some(domain) => catalog.in_domain(domain).collect(),
            None => catalog.entries().collect(),
        };

        match cli.output_format {
            OutputFormat::Json => {
                let output = json!({
                    "domain": self.domain,
                    "count": datasets.len(),
                    "datasets": datasets,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Human => print!("{}", render_datasets(&datasets)),
        }
        Ok(())
    }
}

/// Organizations subcommand
#[derive(Debug, Args)]
pub struct OrganizationsCommand {}

impl OrganizationsCommand {
    /// Fetch the organization list and print it.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let transport = PortalHttpClient::new(&config)?;
        let organizations = fetch_organizations(&transport, &config.server).await?;

        match cli.output_format {
            OutputFormat::Json => {
                let output = json!({
                    "count": organizations.len(),
                    "organizations": organizations,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Human => print!("{}", render_organizations(&organizations)),
        }
        Ok(())
    }
}

fn render_datasets(datasets: &[&DatasetInfo]) -> String {
    if datasets.is_empty() {
        return "No datasets found\n".to_string();
    }

    let mut datasets = datasets.to_vec();
    datasets.sort_by(|a, b| a.domain.cmp(&b.domain).then_with(|| a.name.cmp(&b.name)));

    let name_width = datasets.iter().map(|d| d.name.len()).max().unwrap_or(0);
    let mut out = format!("Found {} dataset(s):\n\n", datasets.len());
    let mut domain = "";
    for dataset in &datasets {
        if dataset.domain != domain {
            domain = &dataset.domain;
            out.push_str(&format!("[{domain}]\n"));
        }
        out.push_str(&format!(
            "  {:<width$}  {} columns",
            dataset.name,
            dataset.available_columns.len(),
            width = name_width
        ));
        if let Some(description) = &dataset.description {
            out.push_str(&format!("  {description}"));
        }
        out.push('\n');
    }
    out
}

fn render_organizations(organizations: &[OrganizationInfo]) -> String {
    if organizations.is_empty() {
        return "No organizations found\n".to_string();
    }

    let mut out = format!("Found {} organization(s):\n\n", organizations.len());
    for org in organizations {
        out.push_str(&format!("  {}", org.id));
        if let Some(name) = org.name.as_ref().or(org.acronym.as_ref()) {
            out.push_str(&format!("  {name}"));
        }
        out.push('\n');
    }
    out
}
