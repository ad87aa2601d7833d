//! Command-line interface for the harvester.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{
    validate_date_range, validate_metadata_prefix, ClientConfig, HttpMethod,
    DEFAULT_MAX_RETRIES, DEFAULT_METADATA_PREFIX, HTTP_TIMEOUT_SECS,
};
use crate::error::{HarvesterError, Result};
use crate::exporter::{write_records_csv, FieldMapping, ItemDocument, ItemExporter};
use crate::harvester::{ListOptions, OaiClient};
use crate::record::Record;
use crate::submit::{DSpaceClient, ItemSubmitter};

/// OAI-PMH harvester - harvest metadata records and export them as DSpace items.
#[derive(Parser)]
#[command(name = "oai-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that talks to an OAI-PMH endpoint.
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// HTTP method for OAI-PMH requests (get or post)
    #[arg(long, default_value = "get")]
    pub method: String,

    /// Timeout per request in seconds
    #[arg(long, default_value_t = HTTP_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Retries after a failed attempt
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

impl ConnectionArgs {
    fn client_config(&self, url: &str) -> Result<ClientConfig> {
        let config = ClientConfig::new(url)
            .with_http_method(self.method.parse::<HttpMethod>()?)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_max_retries(self.max_retries)
            .with_accept_invalid_certs(self.insecure);
        config.validate()?;
        Ok(config)
    }
}

/// Output format of the harvest command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// DSpace item documents
    Items,
    /// Harvested records as JSON
    Json,
    /// One CSV row per record
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest records from an OAI-PMH endpoint.
    Harvest {
        /// OAI-PMH base URL
        url: String,

        /// Metadata prefix
        #[arg(short, long, default_value = DEFAULT_METADATA_PREFIX)]
        prefix: String,

        /// Only harvest records in this set
        #[arg(short, long)]
        set: Option<String>,

        /// Lower datestamp bound (YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ)
        #[arg(long)]
        from: Option<String>,

        /// Upper datestamp bound
        #[arg(long)]
        until: Option<String>,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Items)]
        format: OutputFormat,

        /// JSON file with field mapping overrides
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Show repository information.
    Identify {
        /// OAI-PMH base URL
        url: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List the sets of a repository.
    Sets {
        /// OAI-PMH base URL
        url: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List the metadata formats of a repository or of one record.
    Formats {
        /// OAI-PMH base URL
        url: String,

        /// Only formats available for this record
        #[arg(short, long)]
        identifier: Option<String>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Fetch a single record and print it as JSON.
    Get {
        /// OAI-PMH base URL
        url: String,

        /// Record identifier
        identifier: String,

        /// Metadata prefix
        #[arg(short, long, default_value = DEFAULT_METADATA_PREFIX)]
        prefix: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Upload exported item documents to a DSpace collection.
    Upload {
        /// JSON file produced by `harvest --format items`
        items: PathBuf,

        /// DSpace REST base URL (e.g. https://demo.dspace.org/server)
        #[arg(long)]
        dspace_url: String,

        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long)]
        password: String,

        /// Target collection UUID
        #[arg(long)]
        collection: String,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            url,
            prefix,
            set,
            from,
            until,
            limit,
            output,
            format,
            mapping,
            connection,
        } => {
            let mut options = ListOptions::new(prefix);
            options.set_spec = set;
            options.from = from;
            options.until = until;
            harvest_command(
                &url,
                &options,
                &HarvestOutput {
                    limit,
                    path: output,
                    format,
                    mapping,
                },
                &connection,
            )
        }
        Commands::Identify { url, connection } => identify_command(&url, &connection),
        Commands::Sets { url, connection } => sets_command(&url, &connection),
        Commands::Formats {
            url,
            identifier,
            connection,
        } => formats_command(&url, identifier.as_deref(), &connection),
        Commands::Get {
            url,
            identifier,
            prefix,
            connection,
        } => get_command(&url, &identifier, &prefix, &connection),
        Commands::Upload {
            items,
            dspace_url,
            email,
            password,
            collection,
            insecure,
        } => upload_command(&items, &dspace_url, &email, &password, &collection, insecure),
    }
}

/// Where and how harvested records end up.
struct HarvestOutput {
    limit: Option<usize>,
    path: Option<PathBuf>,
    format: OutputFormat,
    mapping: Option<PathBuf>,
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Execute the harvest command.
fn harvest_command(
    url: &str,
    options: &ListOptions,
    output: &HarvestOutput,
    connection: &ConnectionArgs,
) -> Result<()> {
    // Validate everything before the first request
    validate_metadata_prefix(&options.metadata_prefix)?;
    validate_date_range(options.from.as_deref(), options.until.as_deref())?;
    let client = OaiClient::new(connection.client_config(url)?)?;
    let mapping = match &output.mapping {
        Some(path) => FieldMapping::from_json_file(path)?,
        None => FieldMapping::default(),
    };

    eprintln!(
        "{} {} ({})",
        style("Harvesting").bold(),
        style(url).cyan(),
        style(&options.metadata_prefix).green()
    );
    tracing::info!(
        url,
        prefix = %options.metadata_prefix,
        set = ?options.set_spec,
        "Harvest started"
    );

    let pb = spinner();
    let records = match collect_records(&client, options, output.limit, &pb) {
        Ok(records) => records,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    pb.finish_and_clear();

    let deleted = records.iter().filter(|r| r.deleted).count();
    tracing::info!(records = records.len(), deleted, "Harvest finished");
    eprintln!("  Records: {}", records.len());
    if deleted > 0 {
        eprintln!("  Deleted: {}", style(deleted).yellow().bold());
    }

    let rendered = render(&records, output.format, mapping)?;
    match &output.path {
        Some(path) => {
            fs::write(path, rendered)?;
            eprintln!();
            eprintln!("{} {}", style("Saved to:").green().bold(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&rendered)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn collect_records(
    client: &OaiClient,
    options: &ListOptions,
    limit: Option<usize>,
    pb: &ProgressBar,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for record in client.list_records(options)? {
        match record {
            Ok(record) => records.push(record),
            Err(e) if e.is_no_records_match() => {
                tracing::info!("Repository reports no matching records");
                break;
            }
            Err(e) => return Err(e),
        }
        pb.set_message(format!("{} records harvested", records.len()));
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
    }
    Ok(records)
}

/// Render records in the requested format; deleted records never become items.
fn render(records: &[Record], format: OutputFormat, mapping: FieldMapping) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Items => {
            let live: Vec<Record> = records.iter().filter(|r| !r.deleted).cloned().collect();
            Ok(ItemExporter::new(mapping).to_json(&live)?.into_bytes())
        }
        OutputFormat::Json => Ok(serde_json::to_vec_pretty(records)?),
        OutputFormat::Csv => {
            let mut buffer = Vec::new();
            write_records_csv(records, &mut buffer)?;
            Ok(buffer)
        }
    }
}

fn identify_command(url: &str, connection: &ConnectionArgs) -> Result<()> {
    let client = OaiClient::new(connection.client_config(url)?)?;
    let info = client.identify()?;

    println!("{}", style(&info.repository_name).bold());
    println!("  Base URL: {}", info.base_url);
    println!("  Protocol: {}", info.protocol_version);
    println!("  Earliest datestamp: {}", info.earliest_datestamp);
    println!("  Deleted records: {}", info.deleted_record.as_str());
    if let Some(granularity) = info.granularity {
        println!("  Granularity: {}", granularity.as_str());
    }
    for email in &info.admin_emails {
        println!("  Admin: {}", style(email).cyan());
    }
    Ok(())
}

fn sets_command(url: &str, connection: &ConnectionArgs) -> Result<()> {
    let client = OaiClient::new(connection.client_config(url)?)?;
    for set in client.list_sets() {
        let set = set?;
        println!("{}\t{}", style(&set.set_spec).cyan(), set.set_name);
    }
    Ok(())
}

fn formats_command(
    url: &str,
    identifier: Option<&str>,
    connection: &ConnectionArgs,
) -> Result<()> {
    let client = OaiClient::new(connection.client_config(url)?)?;
    for format in client.list_metadata_formats(identifier)? {
        let format = format?;
        println!(
            "{}\t{}\t{}",
            style(&format.prefix).cyan(),
            format.namespace,
            format.schema
        );
    }
    Ok(())
}

fn get_command(
    url: &str,
    identifier: &str,
    prefix: &str,
    connection: &ConnectionArgs,
) -> Result<()> {
    let client = OaiClient::new(connection.client_config(url)?)?;
    let record = client.get_record(identifier, prefix)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Execute the upload command.
fn upload_command(
    items_path: &Path,
    dspace_url: &str,
    email: &str,
    password: &str,
    collection: &str,
    insecure: bool,
) -> Result<()> {
    if !items_path.is_file() {
        return Err(HarvesterError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Items file does not exist: {}", items_path.display()),
        )));
    }
    let items: Vec<ItemDocument> = serde_json::from_str(&fs::read_to_string(items_path)?)?;
    let mut dspace =
        DSpaceClient::new(dspace_url, email, password)?.with_accept_invalid_certs(insecure)?;

    let pb = ProgressBar::new(items.len() as u64);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green} {pos}/{len} {msg}")
            .expect("valid template"),
    );

    let created = dspace.upload_items(collection, &items, |done, _| pb.set_position(done as u64));
    pb.finish_and_clear();
    let created = created?;

    println!(
        "{} {} items to collection {}",
        style("Uploaded").green().bold(),
        created.len(),
        style(collection).cyan()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_harvest_defaults() {
        let cli = Cli::parse_from(["oai-harvester", "harvest", "https://repo.example.org/oai"]);

        let Commands::Harvest {
            url,
            prefix,
            set,
            format,
            connection,
            ..
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(url, "https://repo.example.org/oai");
        assert_eq!(prefix, "oai_dc");
        assert!(set.is_none());
        assert_eq!(format, OutputFormat::Items);
        assert_eq!(connection.method, "get");
        assert_eq!(connection.max_retries, 3);
    }

    #[test]
    fn test_cli_parse_harvest_with_filters() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "harvest",
            "https://repo.example.org/oai",
            "--set",
            "col_1",
            "--from",
            "2024-01-01",
            "--format",
            "csv",
            "--method",
            "post",
            "--limit",
            "10",
        ]);

        let Commands::Harvest {
            set,
            from,
            format,
            limit,
            connection,
            ..
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(set.as_deref(), Some("col_1"));
        assert_eq!(from.as_deref(), Some("2024-01-01"));
        assert_eq!(format, OutputFormat::Csv);
        assert_eq!(limit, Some(10));
        assert_eq!(connection.method, "post");
    }

    #[test]
    fn test_cli_parse_get() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "get",
            "https://repo.example.org/oai",
            "oai:repo:1",
        ]);

        let Commands::Get {
            identifier, prefix, ..
        } = cli.command
        else {
            panic!("expected get command");
        };
        assert_eq!(identifier, "oai:repo:1");
        assert_eq!(prefix, "oai_dc");
    }

    #[test]
    fn test_cli_parse_upload_insecure() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "upload",
            "items.json",
            "--dspace-url",
            "https://dspace.example.org/server",
            "--email",
            "a@b",
            "--password",
            "pw",
            "--collection",
            "c1",
            "--insecure",
        ]);

        let Commands::Upload {
            collection,
            insecure,
            ..
        } = cli.command
        else {
            panic!("expected upload command");
        };
        assert_eq!(collection, "c1");
        assert!(insecure);
    }

    #[test]
    fn test_connection_args_reject_unknown_method() {
        let args = ConnectionArgs {
            method: "put".to_string(),
            timeout: 30,
            max_retries: 3,
            insecure: false,
        };
        assert!(args.client_config("https://repo.example.org/oai").is_err());
    }

    #[test]
    fn test_render_items_skips_deleted() {
        use crate::metadata::Metadata;
        use crate::record::Header;

        let live = Record::new(
            Header {
                identifier: "oai:repo:1".to_string(),
                datestamp: "2024-01-01".to_string(),
                set_specs: vec![],
                deleted: false,
            },
            Metadata::from_pairs([("dc:title", "T")]),
        );
        let gone = Record::from_header(Header {
            identifier: "oai:repo:2".to_string(),
            datestamp: "2024-01-01".to_string(),
            set_specs: vec![],
            deleted: true,
        });

        let rendered = render(&[live, gone], OutputFormat::Items, FieldMapping::default()).unwrap();
        let items: Vec<ItemDocument> = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "T");
    }
}
