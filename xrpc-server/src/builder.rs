//! Builder for constructing an XML-RPC engine
//!
//! The builder collects everything an [`Engine`] is made of:
//! - Method handlers, namespaces and method providers
//! - Mount path and parser limits
//! - Observability and metrics
//! - The invocation error hook
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::Value;
//! use xrpc_server::{from_async_fn, from_fn, Engine};
//!
//! # fn example() -> xrpc_core::Result<()> {
//! let engine = Engine::builder()
//!     .path("/RPC2")
//!     .max_depth(32)
//!     .handler("echo", from_fn(|params, reply| {
//!         reply.ok(params);
//!         Ok(())
//!     }))
//!     .handler("system.time", from_async_fn(|_| async {
//!         Ok(Value::from("19980717T14:08:55"))
//!     }))
//!     .on_invocation_error(|failure| eprintln!("{}", failure))
//!     .build()?;
//!
//! assert_eq!(engine.config().path, "/RPC2");
//! # Ok(())
//! # }
//! ```

use crate::dispatch::{log_invocation_error, Engine, EngineConfig, ErrorHook, InvocationFailure};
use crate::handler::Handler;
use crate::metrics::ServerMetrics;
use crate::registry::{MethodProvider, RegistryBuilder};
use std::sync::Arc;
use xrpc_core::{Error, ObservabilityConfig, Result};

/// Builder for constructing an [`Engine`]
pub struct EngineBuilder {
    registry: RegistryBuilder,
    config: EngineConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    metrics: Option<Arc<ServerMetrics>>,
    on_error: Option<ErrorHook>,
}

impl EngineBuilder {
    /// Create a new engine builder with default settings
    pub fn new() -> Self {
        Self {
            registry: RegistryBuilder::new(),
            config: EngineConfig::default(),
            observability_config: None,
            service_name: None,
            metrics: None,
            on_error: None,
        }
    }

    /// Register a handler at a method path
    pub fn handler(mut self, path: &str, handler: Box<dyn Handler>) -> Self {
        self.registry = self.registry.handler(path, handler);
        self
    }

    /// Graft a namespace of handlers under a path
    pub fn namespace(mut self, path: &str, methods: RegistryBuilder) -> Self {
        self.registry = self.registry.namespace(path, methods);
        self
    }

    /// Merge the methods an object exposes
    pub fn service(mut self, provider: &impl MethodProvider) -> Self {
        self.registry = self.registry.service(provider);
        self
    }

    /// Merge a prepared registry builder into the one being built
    pub fn registry(mut self, registry: RegistryBuilder) -> Self {
        self.registry = self.registry.merge(registry);
        self
    }

    /// Replace all engine settings
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the route the endpoint is mounted on (default `/`)
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the array/struct nesting bound (default 128)
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Set the request body size bound (default 10 MiB)
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Record metrics on existing instruments without initializing telemetry
    pub fn with_metrics(mut self, metrics: ServerMetrics) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    /// Receive every invocation failure (default: log at `error`)
    pub fn on_invocation_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InvocationFailure) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Build the engine
    ///
    /// Initializes observability first when it was requested.
    pub fn build(self) -> Result<Engine> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            xrpc_core::init_observability(config.clone()).map_err(|e| {
                Error::Config(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ServerMetrics::new(config.service_name.clone())))
        } else {
            self.metrics
        };

        let registry = self.registry.build();
        tracing::info!(
            path = %self.config.path,
            methods = registry.len(),
            "XML-RPC engine ready"
        );

        let on_error: ErrorHook = match self.on_error {
            Some(hook) => hook,
            None => Arc::new(log_invocation_error),
        };

        Ok(Engine::from_parts(registry, self.config, metrics, on_error))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_fn;

    #[test]
    fn test_builder_basic() {
        let engine = EngineBuilder::new()
            .handler(
                "test",
                from_fn(|_, reply| {
                    reply.ok(true);
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        assert!(engine.registry().contains("test"));
        assert!(engine.metrics().is_none());
    }

    #[test]
    fn test_builder_settings() {
        let engine = EngineBuilder::new()
            .path("/RPC2")
            .max_depth(8)
            .max_body_bytes(1024)
            .build()
            .unwrap();

        assert_eq!(
            engine.config(),
            &EngineConfig {
                path: "/RPC2".into(),
                max_depth: 8,
                max_body_bytes: 1024,
            }
        );
    }

    #[test]
    fn test_builder_namespace() {
        let engine = EngineBuilder::new()
            .namespace(
                "a",
                RegistryBuilder::new().handler(
                    "b",
                    from_fn(|_, reply| {
                        reply.ok(1);
                        Ok(())
                    }),
                ),
            )
            .build()
            .unwrap();

        assert_eq!(engine.registry().methods(), vec!["a.b"]);
    }

    #[test]
    fn test_builder_with_metrics() {
        let engine = EngineBuilder::new()
            .with_metrics(ServerMetrics::new("test-builder"))
            .build()
            .unwrap();
        assert!(engine.metrics().is_some());
    }

    #[test]
    fn test_builder_default() {
        let builder = EngineBuilder::default();
        assert!(builder.observability_config.is_none());
        assert_eq!(builder.config, EngineConfig::default());
    }
}
