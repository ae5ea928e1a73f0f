//! Command-line interface for tabexport
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Building export requests from arguments
//! - Utility subcommands (version, completion, config)

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::{ExecutionError, Result};
use crate::export::{DelimitedTextSettings, SpreadsheetSettings, TextEncoding};
use crate::source::{CloudDataset, Credentials, DesktopReport, SourceEntity};

pub mod completion;
pub mod summary;

/// Export analytical tables to delimited text or spreadsheet files
#[derive(Parser, Debug)]
#[command(
    name = "tabexport",
    version,
    about = "Export analytical model tables to CSV or XLSX files",
    long_about = "Exports the tables of a local report or a cloud dataset to one delimited
text file per table or to a single spreadsheet workbook. Press Ctrl+C to cancel a
running export; files written so far are kept."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (no progress or summary)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for tabexport
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export tables to delimited text files, one file per table
    Csv {
        #[command(flatten)]
        source: SourceArgs,

        /// Output directory
        #[arg(short = 'o', long, value_name = "DIR")]
        output: PathBuf,

        /// Field delimiter (defaults to the configured one)
        #[arg(long, value_name = "TEXT")]
        delimiter: Option<String>,

        /// Quote text fields only when needed
        #[arg(long)]
        no_quote: bool,

        /// Text encoding (utf8, utf16)
        #[arg(long, value_name = "ENCODING")]
        encoding: Option<TextEncoding>,
    },

    /// Export tables to a spreadsheet workbook, one worksheet per table
    Xlsx {
        #[command(flatten)]
        source: SourceArgs,

        /// Output workbook file
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Arguments selecting the source to export
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Server hosting the model (for the bundled JSON source, a data directory)
    #[arg(long, value_name = "SERVER")]
    pub server: String,

    /// Database (catalog) holding the model
    #[arg(long, value_name = "NAME")]
    pub database: String,

    /// Report file identifying a desktop report
    #[arg(long, value_name = "PATH", conflicts_with_all = ["workspace", "dataset"])]
    pub report: Option<String>,

    /// Workspace id of a cloud dataset
    #[arg(long, value_name = "ID", requires = "dataset")]
    pub workspace: Option<String>,

    /// Dataset id of a cloud dataset
    #[arg(long, value_name = "ID", requires = "workspace")]
    pub dataset: Option<String>,

    /// Access token for cloud datasets
    #[arg(long, value_name = "TOKEN", env = "TABEXPORT_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Tables to export, comma separated, in order
    #[arg(short = 't', long, value_name = "TABLES", value_delimiter = ',', required = true)]
    pub tables: Vec<String>,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl SourceArgs {
    /// Build the source entity described by the arguments
    pub fn source_entity(&self) -> SourceEntity {
        match (&self.workspace, &self.dataset) {
            (Some(workspace_id), Some(dataset_id)) => CloudDataset {
                workspace_id: workspace_id.clone(),
                dataset_id: dataset_id.clone(),
                display_name: None,
                server_name: Some(self.server.clone()),
                database_name: Some(self.database.clone()),
            }
            .into(),
            _ => DesktopReport {
                report_path: self
                    .report
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}", self.server, self.database)),
                report_name: None,
                server_name: Some(self.server.clone()),
                database_name: Some(self.database.clone()),
            }
            .into(),
        }
    }

    /// Credentials carried by the arguments
    pub fn credentials(&self) -> Credentials {
        match &self.token {
            Some(token) => Credentials::with_access_token(token.clone()),
            None => Credentials::none(),
        }
    }

    /// Table names with surrounding whitespace removed
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.trim().to_string()).collect()
    }
}

/// A fully described export request
#[derive(Debug, Clone)]
pub enum ExportRequest {
    DelimitedText {
        source: SourceEntity,
        credentials: Credentials,
        settings: DelimitedTextSettings,
        show_progress: bool,
    },
    Spreadsheet {
        source: SourceEntity,
        credentials: Credentials,
        settings: SpreadsheetSettings,
        show_progress: bool,
    },
}

impl ExportRequest {
    /// Source entity of the request
    pub fn source(&self) -> &SourceEntity {
        match self {
            ExportRequest::DelimitedText { source, .. } => source,
            ExportRequest::Spreadsheet { source, .. } => source,
        }
    }

    /// Number of requested tables
    pub fn table_count(&self) -> usize {
        match self {
            ExportRequest::DelimitedText { settings, .. } => settings.tables.len(),
            ExportRequest::Spreadsheet { settings, .. } => settings.tables.len(),
        }
    }

    /// Whether a progress spinner should be shown
    pub fn show_progress(&self) -> bool {
        match self {
            ExportRequest::DelimitedText { show_progress, .. } => *show_progress,
            ExportRequest::Spreadsheet { show_progress, .. } => *show_progress,
        }
    }
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_logging_args(&mut config, &args);
        Ok(Self { args, config })
    }

    /// Get the effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the parsed arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply verbosity flags to the logging configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        if args.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if args.verbose {
            config.logging.level = LogLevel::Debug;
        }
    }

    /// Build the export request of the `csv` or `xlsx` subcommand
    ///
    /// # Returns
    /// * `Result<Option<ExportRequest>>` - Request, or None for other subcommands
    pub fn export_request(&self) -> Result<Option<ExportRequest>> {
        let export = &self.config.export;
        let request = match &self.args.command {
            Commands::Csv {
                source,
                output,
                delimiter,
                no_quote,
                encoding,
            } => {
                let mut settings = DelimitedTextSettings::new(output, source.table_names());
                settings.delimiter = delimiter.clone().unwrap_or_else(|| export.delimiter.clone());
                settings.quote_string_fields = export.quote_string_fields && !*no_quote;
                settings.encoding = encoding.unwrap_or(export.encoding);
                settings.validate()?;

                ExportRequest::DelimitedText {
                    source: source.source_entity(),
                    credentials: source.credentials(),
                    settings,
                    show_progress: self.show_progress(source),
                }
            }
            Commands::Xlsx { source, output } => {
                let settings = SpreadsheetSettings::new(output, source.table_names());
                settings.validate()?;
                if !has_xlsx_extension(output) {
                    return Err(ExecutionError::InvalidSettings(format!(
                        "spreadsheet output must end in .xlsx: {}",
                        output.display()
                    ))
                    .into());
                }

                ExportRequest::Spreadsheet {
                    source: source.source_entity(),
                    credentials: source.credentials(),
                    settings,
                    show_progress: self.show_progress(source),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    fn show_progress(&self, source: &SourceArgs) -> bool {
        self.config.export.show_progress && !source.no_progress && !self.args.quiet
    }

    /// Handle utility subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - true if a subcommand was handled
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Commands::Csv { .. } | Commands::Xlsx { .. } => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("tabexport version {}", crate::VERSION);
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return;
        }

        match Config::from_file(&path).and_then(|config| config.validate()) {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => println!("Configuration is invalid: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

fn has_xlsx_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKey;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    fn interface(args: &[&str]) -> CliInterface {
        CliInterface {
            args: parse(args),
            config: Config::default(),
        }
    }

    #[test]
    fn test_csv_args_parsing() {
        let args = parse(&[
            "tabexport", "csv", "--server", "data", "--database", "Model", "--tables",
            "Sales,Customers", "-o", "out",
        ]);
        match args.command {
            Commands::Csv { source, output, .. } => {
                assert_eq!(source.tables, vec!["Sales", "Customers"]);
                assert_eq!(output, PathBuf::from("out"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_tables_are_required() {
        let result = CliArgs::try_parse_from([
            "tabexport", "csv", "--server", "data", "--database", "Model", "-o", "out",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_workspace_requires_dataset() {
        let result = CliArgs::try_parse_from([
            "tabexport", "xlsx", "--server", "s", "--database", "d", "--tables", "T",
            "--workspace", "ws", "-o", "out.xlsx",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_source_entity_from_args() {
        let cli = interface(&[
            "tabexport", "xlsx", "--server", "s", "--database", "d", "--tables", "T",
            "--workspace", "ws", "--dataset", "ds", "-o", "out.xlsx",
        ]);
        let Some(ExportRequest::Spreadsheet { source, .. }) = cli.export_request().unwrap() else {
            panic!("expected a spreadsheet request");
        };
        assert_eq!(source.key(), SourceKey::Dataset("ws/ds".into()));

        let cli = interface(&[
            "tabexport", "csv", "--server", "s", "--database", "d", "--tables", "T", "-o",
            "out",
        ]);
        let request = cli.export_request().unwrap().unwrap();
        assert_eq!(request.source().key(), SourceKey::Report("s/d".into()));
    }

    #[test]
    fn test_csv_request_merges_config() {
        let mut cli = interface(&[
            "tabexport", "csv", "--server", "s", "--database", "d", "--tables", "A, B",
            "-o", "out", "--no-quote", "--encoding", "utf16",
        ]);
        cli.config.export.delimiter = ";".to_string();

        let Some(ExportRequest::DelimitedText { settings, .. }) = cli.export_request().unwrap()
        else {
            panic!("expected a delimited text request");
        };
        assert_eq!(settings.tables, vec!["A", "B"]);
        assert_eq!(settings.delimiter, ";");
        assert!(!settings.quote_string_fields);
        assert_eq!(settings.encoding, TextEncoding::Utf16);
    }

    #[test]
    fn test_xlsx_requires_extension() {
        let cli = interface(&[
            "tabexport", "xlsx", "--server", "s", "--database", "d", "--tables", "T", "-o",
            "out.csv",
        ]);
        assert!(cli.export_request().is_err());
    }

    #[test]
    fn test_verbosity_overrides_config() {
        let mut config = Config::default();
        let args = parse(&["tabexport", "-v", "version"]);
        CliInterface::apply_logging_args(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_utility_commands_build_no_request() {
        let cli = interface(&["tabexport", "version"]);
        assert!(cli.export_request().unwrap().is_none());
    }
}
