//! Unit loading: turn a deployable file into plugin instances.
//!
//! # Responsibilities
//! - Parse `*.unit` TOML documents, directly or from inside a `*.tar` archive
//! - Resolve each document's entry symbol
//! - Instantiate the plugin: compiled-in factory first, else a plugin the
//!   document declares itself
//!
//! # Unit document
//! ```toml
//! symbol = "Orders"          # optional; defaults to the path-derived symbol
//! mount = "/orders"          # required for self-declared plugins
//!
//! [[route]]
//! pattern = "{id}"
//! methods = ["GET"]
//! produces = ["application/json"]
//! status = 200
//! body = "{\"id\": \"{0}\"}"
//! ```
//!
//! # Design Decisions
//! - One loader per deployment cycle; symbols defined by units live only in
//!   that loader, so a redeploy always sees the new document
//! - Catalog lookups win over unit definitions (parent-first delegation)
//! - Every route is compiled while loading, so a bad pattern fails the load
//!   and a redeploy keeps the previous version
//! - `class_prefix` applies to bare symbols of single units only, never to
//!   archive entries

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::deploy::snapshot::UnitKind;
use crate::deploy::DeployError;
use crate::plugin::{Call, Handler, HandlerCatalog, HandlerError, Plugin, RouteDef, Verb};
use crate::routing::cache::MatcherCache;
use crate::routing::headers::ResponseSlot;
use crate::routing::router::normalize_mount;
use crate::routing::{MethodDescriptor, RouterError};

/// Parsed unit document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitDocument {
    pub symbol: Option<String>,
    pub mount: Option<String>,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDecl>,
}

/// One declared route.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDecl {
    pub pattern: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub accepts: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub query: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default = "default_status")]
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Static response headers.
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_status() -> u16 {
    200
}

/// One instantiated plugin and the symbol it was loaded from.
#[derive(Clone)]
pub struct LoadedPlugin {
    pub symbol: String,
    pub plugin: Arc<dyn Plugin>,
}

/// A loaded unit: its path, version and the plugins it contributes.
#[derive(Clone)]
pub struct DeploymentDesc {
    pub path: String,
    pub timestamp: u64,
    pub kind: UnitKind,
    pub plugins: Vec<LoadedPlugin>,
}

impl DeploymentDesc {
    pub fn symbols(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.symbol.as_str()).collect()
    }
}

impl std::fmt::Debug for DeploymentDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentDesc")
            .field("path", &self.path)
            .field("timestamp", &self.timestamp)
            .field("kind", &self.kind)
            .field("symbols", &self.symbols())
            .finish()
    }
}

/// Materializes plugins from unit files.
pub struct UnitLoader<'a> {
    catalog: &'a HandlerCatalog,
    class_prefix: &'a str,
    definitions: HashMap<String, Arc<UnitDocument>>,
    // Scratch cache for route checks; dropped with the loader.
    matchers: MatcherCache,
}

impl<'a> UnitLoader<'a> {
    pub fn new(catalog: &'a HandlerCatalog, class_prefix: &'a str) -> Self {
        Self {
            catalog,
            class_prefix,
            definitions: HashMap::new(),
            matchers: MatcherCache::new(),
        }
    }

    /// Load the unit at `root/relative` into a `DeploymentDesc`.
    pub fn build_deployment_desc(
        &mut self,
        root: &Path,
        relative: &str,
        timestamp: u64,
    ) -> Result<DeploymentDesc, DeployError> {
        let full = root.join(relative);
        let kind = UnitKind::of(&full).ok_or_else(|| DeployError::InvalidUnit {
            unit: relative.to_string(),
            message: "unsupported file type".to_string(),
        })?;

        let io_err = |source: std::io::Error| DeployError::Io {
            path: full.clone(),
            source,
        };

        let plugins = match kind {
            UnitKind::Single => {
                let text = std::fs::read_to_string(&full).map_err(io_err)?;
                vec![self.load_document(relative, relative, &text, false)?]
            }
            UnitKind::Archive => {
                let file = File::open(&full).map_err(io_err)?;
                let mut archive = tar::Archive::new(file);
                let mut plugins = Vec::new();

                for entry in archive.entries().map_err(io_err)? {
                    let mut entry = entry.map_err(io_err)?;
                    if !entry.header().entry_type().is_file() {
                        continue;
                    }
                    let entry_path = entry.path().map_err(io_err)?.to_string_lossy().replace('\\', "/");
                    if UnitKind::of(Path::new(&entry_path)) != Some(UnitKind::Single) {
                        continue;
                    }

                    let mut text = String::new();
                    entry.read_to_string(&mut text).map_err(io_err)?;
                    let unit = format!("{relative}!{entry_path}");
                    plugins.push(self.load_document(&unit, &entry_path, &text, true)?);
                }

                if plugins.is_empty() {
                    return Err(DeployError::EmptyArchive(relative.to_string()));
                }
                plugins
            }
        };

        Ok(DeploymentDesc {
            path: relative.to_string(),
            timestamp,
            kind,
            plugins,
        })
    }

    fn load_document(
        &mut self,
        unit: &str,
        symbol_path: &str,
        text: &str,
        archived: bool,
    ) -> Result<LoadedPlugin, DeployError> {
        let document: UnitDocument = toml::from_str(text).map_err(|e| DeployError::InvalidUnit {
            unit: unit.to_string(),
            message: e.to_string(),
        })?;

        let symbol = document
            .symbol
            .clone()
            .unwrap_or_else(|| symbol_from_path(symbol_path));
        let symbol = if archived { symbol } else { self.qualify(symbol) };

        if let Some(plugin) = self.catalog.instantiate(&symbol) {
            tracing::debug!(unit = %unit, symbol = %symbol, "Resolved unit from catalog");
            let plugin = match &document.mount {
                Some(mount) => Arc::new(Remounted {
                    mount: mount.clone(),
                    inner: plugin,
                }) as Arc<dyn Plugin>,
                None => plugin,
            };
            self.check_routes(unit, plugin.as_ref())?;
            return Ok(LoadedPlugin { symbol, plugin });
        }

        if document.routes.is_empty() {
            return Err(DeployError::UnknownSymbol {
                unit: unit.to_string(),
                symbol,
            });
        }

        let plugin = self.define(unit, &symbol, document)?;
        tracing::debug!(unit = %unit, symbol = %symbol, "Defined plugin from unit");
        Ok(LoadedPlugin { symbol, plugin })
    }

    // Register the document under `symbol` and instantiate it.
    fn define(&mut self, unit: &str, symbol: &str, document: UnitDocument) -> Result<Arc<dyn Plugin>, DeployError> {
        if self.definitions.contains_key(symbol) {
            return Err(DeployError::DuplicateSymbol {
                unit: unit.to_string(),
                symbol: symbol.to_string(),
            });
        }

        let Some(mount) = document.mount.clone() else {
            return Err(DeployError::InvalidUnit {
                unit: unit.to_string(),
                message: "self-declared plugin needs a mount".to_string(),
            });
        };

        for route in &document.routes {
            for method in &route.methods {
                method.parse::<Verb>().map_err(|message| DeployError::InvalidUnit {
                    unit: unit.to_string(),
                    message,
                })?;
            }
        }

        let document = Arc::new(document);
        let plugin: Arc<dyn Plugin> = Arc::new(DeclaredPlugin {
            name: symbol.to_string(),
            mount,
            document: document.clone(),
        });
        self.check_routes(unit, plugin.as_ref())?;
        self.definitions.insert(symbol.to_string(), document);

        Ok(plugin)
    }

    // Compile every route the way the router will, without deploying it.
    fn check_routes(&self, unit: &str, plugin: &dyn Plugin) -> Result<(), DeployError> {
        let invalid = |e: RouterError| DeployError::InvalidUnit {
            unit: unit.to_string(),
            message: e.to_string(),
        };
        let mount = normalize_mount(plugin.mount_path()).map_err(invalid)?;
        for route in plugin.routes() {
            MethodDescriptor::compile(&mount, &route, &self.matchers).map_err(invalid)?;
        }
        Ok(())
    }

    fn qualify(&self, symbol: String) -> String {
        if symbol.contains('.') || self.class_prefix.is_empty() {
            symbol
        } else if self.class_prefix.ends_with('.') {
            format!("{}{}", self.class_prefix, symbol)
        } else {
            format!("{}.{}", self.class_prefix, symbol)
        }
    }

    /// Symbols this loader defined from unit documents.
    pub fn defined_symbols(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

/// `orders/Invoice.unit` → `orders.Invoice`
pub fn symbol_from_path(path: &str) -> String {
    let trimmed = path
        .strip_suffix(&format!(".{}", crate::deploy::snapshot::UNIT_EXTENSION))
        .unwrap_or(path);
    trimmed.trim_start_matches('/').replace('/', ".")
}

/// A catalog plugin mounted somewhere other than its default path.
struct Remounted {
    mount: String,
    inner: Arc<dyn Plugin>,
}

impl Plugin for Remounted {
    fn mount_path(&self) -> &str {
        &self.mount
    }

    fn routes(&self) -> Vec<RouteDef> {
        self.inner.routes()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Plugin whose routes come entirely from a unit document.
struct DeclaredPlugin {
    name: String,
    mount: String,
    document: Arc<UnitDocument>,
}

impl Plugin for DeclaredPlugin {
    fn mount_path(&self) -> &str {
        &self.mount
    }

    fn routes(&self) -> Vec<RouteDef> {
        self.document
            .routes
            .iter()
            .map(|decl| {
                let mut names: Vec<&String> = decl.response_headers.keys().collect();
                names.sort();
                let values: Vec<String> = names.iter().map(|n| decl.response_headers[*n].clone()).collect();

                let handler = TemplateHandler {
                    status: decl.status,
                    content_type: decl.content_type.clone(),
                    body: decl.body.clone(),
                    header_values: values,
                };

                let mut route = RouteDef::new(decl.pattern.clone(), handler)
                    .methods(decl.methods.iter().filter_map(|m| m.parse::<Verb>().ok()))
                    .accepts(decl.accepts.iter().cloned())
                    .produces(decl.produces.iter().cloned())
                    .query(decl.query.iter().cloned())
                    .request_headers(decl.headers.iter().cloned());
                for name in names {
                    route = route.response_header(ResponseSlot::text(name.clone()));
                }
                route
            })
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Renders a fixed response. `{N}` is replaced with path capture N,
/// `{query.N}` with query value N and `{body}` with the request body.
struct TemplateHandler {
    status: u16,
    content_type: Option<String>,
    body: String,
    header_values: Vec<String>,
}

impl Handler for TemplateHandler {
    fn handle(&self, call: &mut Call) -> Result<u16, HandlerError> {
        let rendered = render_template(&self.body, call)?;
        for (index, value) in self.header_values.iter().enumerate() {
            if let Some(slot) = call.response_header(index) {
                slot.push_str(value);
            }
        }
        if let Some(content_type) = &self.content_type {
            call.set_content_type(content_type.clone());
        }
        call.write_all(rendered.as_bytes())?;
        Ok(self.status)
    }
}

fn render_template(template: &str, call: &Call) -> Result<String, HandlerError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };

        match placeholder(&after[..close], call)? {
            Some(value) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                // Not a placeholder: keep the brace and rescan what follows.
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

// `None` means "not a placeholder", so the text is kept literally.
fn placeholder(key: &str, call: &Call) -> Result<Option<String>, HandlerError> {
    if key == "body" {
        return call.body_text().map(|s| Some(s.to_string()));
    }
    if let Some(index) = key.strip_prefix("query.").and_then(|n| n.parse::<usize>().ok()) {
        return Ok(Some(call.query(index).unwrap_or_default().to_string()));
    }
    if let Ok(index) = key.parse::<usize>() {
        return Ok(Some(call.path(index).unwrap_or_default().to_string()));
    }
    Ok(None)
}
