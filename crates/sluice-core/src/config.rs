use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{PipelineError, Result};

pub const DEFAULT_SOURCE_CONN_ID: &str = "postgres";
pub const DEFAULT_SINK_CONN_ID: &str = "mariadb_local";
const CONN_ENV_PREFIX: &str = "AIRFLOW_CONN_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    MySql,
}

/// A database connection resolved from the registry.
#[derive(Clone)]
pub struct Connection {
    pub conn_id: String,
    pub backend: Backend,
    url: Url,
}

impl Connection {
    pub fn parse(conn_id: &str, uri: &str) -> Result<Self> {
        let mut url = Url::parse(uri).map_err(|err| {
            PipelineError::Config(format!("connection '{conn_id}' has an invalid URI: {err}"))
        })?;

        let backend = match url.scheme() {
            "postgres" | "postgresql" => Backend::Postgres,
            "mysql" => Backend::MySql,
            "mariadb" => {
                url.set_scheme("mysql").map_err(|_| {
                    PipelineError::Config(format!("connection '{conn_id}' cannot use mysql://"))
                })?;
                Backend::MySql
            }
            other => {
                return Err(PipelineError::Config(format!(
                    "connection '{conn_id}' uses unsupported scheme '{other}'"
                )))
            }
        };

        Ok(Self {
            conn_id: conn_id.to_string(),
            backend,
            url,
        })
    }

    /// URL handed to the database driver.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn require(&self, backend: Backend) -> Result<&Self> {
        if self.backend == backend {
            Ok(self)
        } else {
            Err(PipelineError::Config(format!(
                "connection '{}' is {:?}, expected {:?}",
                self.conn_id, self.backend, backend
            )))
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("conn_id", &self.conn_id)
            .field("backend", &self.backend)
            .field("url", &self.to_string())
            .finish()
    }
}

/// Prints the URL with the password masked.
impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut redacted = self.url.clone();
        if redacted.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        f.write_str(redacted.as_str())
    }
}

/// Named database connections, looked up the way Airflow exposes them to tasks:
/// connection id `mariadb_local` lives in `AIRFLOW_CONN_MARIADB_LOCAL`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    uris: HashMap<String, String>,
}

impl ConnectionRegistry {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let uris = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.as_ref()
                    .strip_prefix(CONN_ENV_PREFIX)
                    .map(|id| (env_suffix(id), value.into()))
            })
            .collect();
        Self { uris }
    }

    pub fn resolve(&self, conn_id: &str) -> Result<Connection> {
        let uri = self.uris.get(&env_suffix(conn_id)).ok_or_else(|| {
            PipelineError::Config(format!(
                "connection '{conn_id}' is not defined; set {CONN_ENV_PREFIX}{}",
                env_suffix(conn_id)
            ))
        })?;
        Connection::parse(conn_id, uri)
    }
}

fn env_suffix(conn_id: &str) -> String {
    conn_id.to_ascii_uppercase().replace('-', "_")
}

/// Header rows to retry with when a worksheet's own header row has duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFallbacks {
    worksheets: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct HeaderFallbackFile {
    #[serde(default)]
    worksheets: BTreeMap<String, Vec<String>>,
}

impl HeaderFallbacks {
    pub fn empty() -> Self {
        Self {
            worksheets: BTreeMap::new(),
        }
    }

    /// The five bike-shop worksheets the extraction was first written for.
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 5] = [
            ("Clientes_Bike", &["ClienteID", "Cliente", "Estado", "Sexo", "Status"]),
            ("Vendedores_Bike", &["VendedorID", "Vendedor"]),
            ("Produtos_Bike", &["ProdutoID", "Produto", "Preco"]),
            (
                "Vendas_Bike",
                &["VendasID", "VendedorID", "ClienteID", "Data", "Total"],
            ),
            (
                "ItensVendas_Bike",
                &[
                    "ProdutoID",
                    "VendasID",
                    "Quantidade",
                    "ValorUnitario",
                    "ValorTotal",
                    "Desconto",
                    "TotalComDesconto",
                ],
            ),
        ];

        let mut fallbacks = Self::empty();
        for (worksheet, headers) in table {
            fallbacks.insert(worksheet, headers.iter().map(|h| h.to_string()).collect());
        }
        fallbacks
    }

    /// Parses a TOML document with a `[worksheets]` table of string arrays.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let parsed: HeaderFallbackFile = toml::from_str(document)
            .map_err(|err| PipelineError::Config(format!("invalid header fallback file: {err}")))?;
        Ok(Self {
            worksheets: parsed.worksheets,
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path)?;
        Self::from_toml_str(&document)
    }

    pub fn insert(&mut self, worksheet: impl Into<String>, headers: Vec<String>) {
        self.worksheets.insert(worksheet.into(), headers);
    }

    pub fn get(&self, worksheet: &str) -> Option<&[String]> {
        self.worksheets.get(worksheet).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.worksheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worksheets.is_empty()
    }
}

impl Default for HeaderFallbacks {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_airflow_style_connection_variables() {
        let registry = ConnectionRegistry::from_vars([
            ("AIRFLOW_CONN_POSTGRES", "postgresql://etl:secret@db:5432/shop"),
            ("AIRFLOW_CONN_MARIADB_LOCAL", "mariadb://etl:pw@maria:3306/sheets"),
            ("UNRELATED", "x"),
        ]);

        let source = registry.resolve("postgres").unwrap();
        assert_eq!(source.backend, Backend::Postgres);
        assert_eq!(source.to_string(), "postgresql://etl:***@db:5432/shop");

        let sink = registry.resolve("mariadb_local").unwrap();
        assert_eq!(sink.backend, Backend::MySql);
        assert_eq!(sink.url(), "mysql://etl:pw@maria:3306/sheets");
        assert!(sink.require(Backend::Postgres).is_err());

        assert!(registry.resolve("missing").is_err());
    }

    #[test]
    fn variable_names_and_lookups_normalise_alike() {
        let registry = ConnectionRegistry::from_vars([(
            "AIRFLOW_CONN_mariadb-local",
            "mysql://etl:pw@maria:3306/sheets",
        )]);

        assert!(registry.resolve("mariadb_local").is_ok());
        assert!(registry.resolve("mariadb-local").is_ok());
        assert!(registry.resolve("MARIADB_LOCAL").is_ok());
    }

    #[test]
    fn rejects_unsupported_schemes() {
        assert!(Connection::parse("x", "sqlite://local.db").is_err());
        assert!(Connection::parse("x", "not a url").is_err());
    }

    #[test]
    fn builtin_fallbacks_cover_known_worksheets() {
        let fallbacks = HeaderFallbacks::builtin();
        assert_eq!(fallbacks.len(), 5);
        assert_eq!(
            fallbacks.get("Clientes_Bike").unwrap(),
            ["ClienteID", "Cliente", "Estado", "Sexo", "Status"]
        );
        assert!(fallbacks.get("Planilha1").is_none());
    }

    #[test]
    fn fallbacks_load_from_toml() {
        let fallbacks = HeaderFallbacks::from_toml_str(
            r#"
                [worksheets]
                Estoque = ["ProdutoID", "Quantidade"]
            "#,
        )
        .unwrap();
        assert_eq!(fallbacks.get("Estoque").unwrap(), ["ProdutoID", "Quantidade"]);
        assert!(fallbacks.get("Clientes_Bike").is_none());

        assert!(HeaderFallbacks::from_toml_str("worksheets = 3").is_err());
    }
}
