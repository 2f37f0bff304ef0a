//! Path-pattern route matching.
//!
//! A pattern such as `/users/:id/posts/:post` compiles to an anchored regex
//! where each `:name` token captures exactly one path segment. Routes are
//! tried in registration order and the first match wins.

use std::sync::Arc;

use gate_core::{Action, HttpMethod, Params};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::errors::ServerError;

/// A compiled route pattern.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    regex: Regex,
    names: Vec<String>,
}

impl CompiledPattern {
    /// Compile a `:name` pattern. A missing leading `/` is added.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::from("^");
        let mut names = Vec::new();
        let mut literal = String::new();

        if !pattern.starts_with('/') {
            literal.push('/');
        }

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == ':' && chars.peek().is_some_and(|n| is_word(*n)) {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if !is_word(n) {
                        break;
                    }
                    name.push(n);
                    let _ = chars.next();
                }
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str("([^/]+)");
                names.push(name);
            } else {
                literal.push(c);
            }
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');

        Ok(Self {
            regex: Regex::new(&source)?,
            names,
        })
    }

    /// Parameter names in pattern order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Match a full path, returning captured segments in pattern order.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = caps.get(i + 1).map_or("", |m| m.as_str());
                    (name.clone(), value.to_owned())
                })
                .collect(),
        )
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// One entry of the route table.
#[derive(Clone, Debug)]
pub struct Route {
    /// Bound verb.
    pub method: HttpMethod,
    /// Pattern as declared by the action.
    pub pattern: String,
    compiled: CompiledPattern,
    action: Arc<Action>,
}

impl Route {
    /// Owning action.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }
}

/// Result of a successful lookup.
#[derive(Clone, Debug)]
pub struct RouteMatch {
    /// Matched action.
    pub action: Arc<Action>,
    /// Captured path parameters, in pattern order, as literal text.
    pub params: Vec<(String, String)>,
}

impl RouteMatch {
    /// Path parameters as a params map of strings.
    pub fn to_params(&self) -> Params {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

/// Ordered list of compiled routes.
///
/// Written once per initialization, read on every request.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Route>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with routes for every action that has a web binding.
    ///
    /// On error the previous table is kept.
    pub fn rebuild(&self, actions: &[Arc<Action>]) -> Result<usize, ServerError> {
        let mut routes = Vec::new();
        for action in actions {
            let Some(web) = action.web_binding() else {
                continue;
            };
            let compiled =
                CompiledPattern::compile(&web.route).map_err(|source| ServerError::InvalidRoute {
                    action: action.name().to_owned(),
                    pattern: web.route.clone(),
                    source,
                })?;
            debug!(method = %web.method, route = %web.route, action = action.name(), "registered route");
            routes.push(Route {
                method: web.method,
                pattern: web.route.clone(),
                compiled,
                action: Arc::clone(action),
            });
        }
        let count = routes.len();
        *self.routes.write() = routes;
        Ok(count)
    }

    /// First route, in registration order, whose method and pattern match.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Option<RouteMatch> {
        let routes = self.routes.read();
        routes
            .iter()
            .filter(|r| r.method == method)
            .find_map(|r| {
                r.compiled.captures(path).map(|params| RouteMatch {
                    action: Arc::clone(&r.action),
                    params,
                })
            })
    }

    /// Snapshot of the table.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
