//! Export sources and connection parameter resolution
//!
//! Two kinds of sources can be exported:
//! - [`DesktopReport`]: a report opened by a local analytical engine
//! - [`CloudDataset`]: a dataset hosted in a cloud workspace, reachable with
//!   an access token
//!
//! Each source has a stable [`SourceKey`] used to enforce one running export
//! per source, and is turned into [`ConnectionParameters`] by a
//! [`ConnectionResolver`] before any job is created.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionString;
use crate::error::{ResolveError, Result};

/// Stable identity of an export source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum SourceKey {
    /// Desktop report, keyed by its file path
    Report(String),
    /// Cloud dataset, keyed by `<workspace id>/<dataset id>`
    Dataset(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Report(path) => write!(f, "report '{path}'"),
            SourceKey::Dataset(id) => write!(f, "dataset '{id}'"),
        }
    }
}

/// A report opened by a local analytical engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesktopReport {
    /// Path of the report file, the report's identity
    pub report_path: String,
    /// Display name
    #[serde(default)]
    pub report_name: Option<String>,
    /// Address of the local engine hosting the model
    #[serde(default)]
    pub server_name: Option<String>,
    /// Database (catalog) holding the model
    #[serde(default)]
    pub database_name: Option<String>,
}

/// A dataset hosted in a cloud workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDataset {
    pub workspace_id: String,
    pub dataset_id: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Workspace endpoint
    #[serde(default)]
    pub server_name: Option<String>,
    /// Database (catalog) name of the dataset
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Any exportable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceEntity {
    DesktopReport(DesktopReport),
    CloudDataset(CloudDataset),
}

impl SourceEntity {
    /// Stable key of this source
    pub fn key(&self) -> SourceKey {
        match self {
            SourceEntity::DesktopReport(report) => SourceKey::Report(report.report_path.clone()),
            SourceEntity::CloudDataset(dataset) => SourceKey::Dataset(format!(
                "{}/{}",
                dataset.workspace_id, dataset.dataset_id
            )),
        }
    }

    /// Human readable name, falling back to the key
    pub fn display_name(&self) -> String {
        let name = match self {
            SourceEntity::DesktopReport(report) => report.report_name.clone(),
            SourceEntity::CloudDataset(dataset) => dataset.display_name.clone(),
        };
        name.unwrap_or_else(|| self.key().to_string())
    }
}

impl From<DesktopReport> for SourceEntity {
    fn from(report: DesktopReport) -> Self {
        SourceEntity::DesktopReport(report)
    }
}

impl From<CloudDataset> for SourceEntity {
    fn from(dataset: CloudDataset) -> Self {
        SourceEntity::CloudDataset(dataset)
    }
}

/// Credentials supplied by a caller that already handled sign-in
#[derive(Clone, Default)]
pub struct Credentials {
    access_token: Option<String>,
}

impl Credentials {
    /// No credentials, enough for desktop reports
    pub fn none() -> Self {
        Self::default()
    }

    /// Credentials carrying an access token
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
        }
    }

    /// Access token, if any
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Resolved parameters needed to open a connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub connection_string: String,
    pub database_name: String,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The connection string may embed an access token
        f.debug_struct("ConnectionParameters")
            .field("database_name", &self.database_name)
            .finish_non_exhaustive()
    }
}

/// Resolves connection parameters for a source
pub trait ConnectionResolver: Send + Sync {
    /// Resolve the connection string and catalog for `source`
    ///
    /// # Returns
    /// * `Result<ConnectionParameters>` - Parameters, or a resolve error
    ///   naming what is missing
    fn resolve(
        &self,
        source: &SourceEntity,
        credentials: &Credentials,
    ) -> Result<ConnectionParameters>;
}

/// Builds connection strings from the fields of the source entity
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionResolver;

impl ConnectionResolver for DefaultConnectionResolver {
    fn resolve(
        &self,
        source: &SourceEntity,
        credentials: &Credentials,
    ) -> Result<ConnectionParameters> {
        match source {
            SourceEntity::DesktopReport(report) => {
                let server = required(&report.server_name, ResolveError::MissingServerName)?;
                let database = required(&report.database_name, ResolveError::MissingDatabaseName)?;

                Ok(ConnectionParameters {
                    connection_string: ConnectionString::format(&[(
                        ConnectionString::DATA_SOURCE,
                        server,
                    )]),
                    database_name: database.to_string(),
                })
            }
            SourceEntity::CloudDataset(dataset) => {
                let server = required(&dataset.server_name, ResolveError::MissingServerName)?;
                let database =
                    required(&dataset.database_name, ResolveError::MissingDatabaseName)?;
                let token = credentials
                    .access_token()
                    .ok_or(ResolveError::SignInRequired)?;

                Ok(ConnectionParameters {
                    connection_string: ConnectionString::format(&[
                        (ConnectionString::DATA_SOURCE, server),
                        (ConnectionString::INITIAL_CATALOG, database),
                        (ConnectionString::PASSWORD, token),
                    ]),
                    database_name: database.to_string(),
                })
            }
        }
    }
}

fn required(value: &Option<String>, missing: ResolveError) -> Result<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    fn report() -> DesktopReport {
        DesktopReport {
            report_path: "C:/reports/sales.pbix".into(),
            report_name: Some("Sales".into()),
            server_name: Some("localhost:52000".into()),
            database_name: Some("a1b2".into()),
        }
    }

    fn dataset() -> CloudDataset {
        CloudDataset {
            workspace_id: "ws".into(),
            dataset_id: "ds".into(),
            display_name: None,
            server_name: Some("powerbi://api.example.com/v1.0/myorg/Finance".into()),
            database_name: Some("Finance Model".into()),
        }
    }

    #[test]
    fn test_keys_distinguish_kinds() {
        let report = SourceEntity::from(report());
        let dataset = SourceEntity::from(dataset());
        assert_eq!(report.key(), SourceKey::Report("C:/reports/sales.pbix".into()));
        assert_eq!(dataset.key(), SourceKey::Dataset("ws/ds".into()));
        assert_eq!(dataset.display_name(), "dataset 'ws/ds'");
        assert_eq!(report.display_name(), "Sales");
    }

    #[test]
    fn test_resolve_desktop_report() {
        let params = DefaultConnectionResolver
            .resolve(&report().into(), &Credentials::none())
            .unwrap();
        assert_eq!(params.connection_string, "Data Source=localhost:52000");
        assert_eq!(params.database_name, "a1b2");
    }

    #[test]
    fn test_resolve_cloud_dataset_requires_token() {
        let source: SourceEntity = dataset().into();
        let err = DefaultConnectionResolver
            .resolve(&source, &Credentials::none())
            .unwrap_err();
        assert!(matches!(err, ExportError::Resolve(ResolveError::SignInRequired)));

        let params = DefaultConnectionResolver
            .resolve(&source, &Credentials::with_access_token("tok"))
            .unwrap();
        let cs = ConnectionString::parse(&params.connection_string).unwrap();
        assert_eq!(cs.get("Initial Catalog"), Some("Finance Model"));
        assert_eq!(cs.get("Password"), Some("tok"));
    }

    #[test]
    fn test_resolve_quotes_separators_in_names() {
        let mut dataset = dataset();
        dataset.database_name = Some("Fin;Password=evil".into());
        let params = DefaultConnectionResolver
            .resolve(&dataset.into(), &Credentials::with_access_token("tok"))
            .unwrap();

        let cs = ConnectionString::parse(&params.connection_string).unwrap();
        assert_eq!(cs.get("Initial Catalog"), Some("Fin;Password=evil"));
        assert_eq!(cs.get("Password"), Some("tok"));
        assert_eq!(params.database_name, "Fin;Password=evil");

        let mut report = report();
        report.server_name = Some("host;Initial Catalog=other".into());
        let params = DefaultConnectionResolver
            .resolve(&report.into(), &Credentials::none())
            .unwrap();
        let cs = ConnectionString::parse(&params.connection_string).unwrap();
        assert_eq!(cs.data_source(), Some("host;Initial Catalog=other"));
        assert_eq!(cs.get("Initial Catalog"), None);
    }

    #[test]
    fn test_resolve_missing_fields() {
        let mut missing_server = report();
        missing_server.server_name = Some("  ".into());
        let err = DefaultConnectionResolver
            .resolve(&missing_server.into(), &Credentials::none())
            .unwrap_err();
        assert!(matches!(err, ExportError::Resolve(ResolveError::MissingServerName)));

        let mut missing_db = report();
        missing_db.database_name = None;
        let err = DefaultConnectionResolver
            .resolve(&missing_db.into(), &Credentials::none())
            .unwrap_err();
        assert!(matches!(err, ExportError::Resolve(ResolveError::MissingDatabaseName)));
    }

    #[test]
    fn test_secrets_not_in_debug_output() {
        let creds = Credentials::with_access_token("secret-token");
        assert!(!format!("{creds:?}").contains("secret-token"));

        let params = DefaultConnectionResolver
            .resolve(&dataset().into(), &creds)
            .unwrap();
        assert!(!format!("{params:?}").contains("secret-token"));
    }

    #[test]
    fn test_source_entity_deserializes_tagged() {
        let json = r#"{"kind":"desktopReport","reportPath":"x.pbix","serverName":"s","databaseName":"d"}"#;
        let source: SourceEntity = serde_json::from_str(json).unwrap();
        assert_eq!(source.key(), SourceKey::Report("x.pbix".into()));
    }
}
