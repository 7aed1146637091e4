//! HTTP surface for `cp-core serve`.
//!
//! Routes:
//! - `/probe/{strategy}`: one probe run per request, fresh run prefix
//! - `/count`, `/count/paged`: entity count for the configured kind
//! - `/stat`: kind statistics
//! - `/health`: liveness
//!
//! Query parameters `trials`, `delay_ms`, `max_attempts`, `kind`, `page_size`,
//! and `format` override the configured defaults for that request.
//!
//! Every request runs on its own thread; the store is the only shared state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cp_common::{OutputFormat, ReadStrategy, RunPrefix};
use cp_config::{validate_config, ProbeConfig};
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use crate::inspect::{self, DEFAULT_PAGE_SIZE};
use crate::logging::{event_names, LogContext, Stage};
use crate::log_event;
use crate::probe::{ProbeOptions, ProbeRunner, TracingProbeLog};
use crate::report;
use crate::store::Datastore;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A rendered HTTP response, independent of the socket layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn ok(format: OutputFormat, body: String) -> Self {
        Response {
            status: 200,
            content_type: format.content_type(),
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Response {
            status,
            content_type: TEXT_PLAIN,
            body: body.into(),
        }
    }

    fn failure(status: u16, err: &cp_common::Error, format: OutputFormat) -> Self {
        Response {
            status,
            content_type: format.content_type(),
            body: report::render_failure(err, format),
        }
    }
}

/// Per-request overrides parsed from the query string.
#[derive(Debug, Default, PartialEq)]
struct RequestParams {
    trials: Option<u32>,
    delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    kind: Option<String>,
    page_size: Option<usize>,
    format: Option<OutputFormat>,
}

fn parse_param<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {}: {:?}", name, value))
}

impl RequestParams {
    fn parse(query: &str) -> Result<Self, String> {
        let mut params = RequestParams::default();
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let name = name.as_ref();
            match name {
                "trials" => params.trials = Some(parse_param(name, &value)?),
                "delay_ms" => params.delay_ms = Some(parse_param(name, &value)?),
                "max_attempts" => params.max_attempts = Some(parse_param(name, &value)?),
                "kind" => params.kind = Some(value.into_owned()),
                "page_size" => params.page_size = Some(parse_param(name, &value)?),
                "format" => params.format = Some(parse_param(name, &value)?),
                _ => {}
            }
        }
        Ok(params)
    }

    /// The configuration with this request's overrides applied.
    fn apply(&self, config: &ProbeConfig) -> ProbeConfig {
        let mut config = config.clone();
        if let Some(trials) = self.trials {
            config.trial_count = trials;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.attempt_delay_ms = delay_ms;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(kind) = &self.kind {
            config.kind = kind.clone();
        }
        config
    }
}

/// Dispatch one request. Pure apart from the store and logging.
pub fn route_request<S: Datastore + ?Sized>(
    store: &S,
    config: &ProbeConfig,
    ctx: &LogContext,
    method: &str,
    url: &str,
) -> Response {
    if !method.eq_ignore_ascii_case("GET") {
        return Response::text(405, "method not allowed");
    }

    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let params = match RequestParams::parse(query) {
        Ok(params) => params,
        Err(message) => return Response::text(400, message),
    };
    let format = params.format.unwrap_or_default();
    let config = params.apply(config);
    if let Err(err) = validate_config(&config) {
        return Response::text(400, err.to_string());
    }

    if let Some(name) = path.strip_prefix("/probe/") {
        return match name.parse::<ReadStrategy>() {
            Ok(strategy) => run_probe(store, &config, ctx, strategy, format),
            Err(message) => Response::text(404, message),
        };
    }

    match path {
        "/health" => Response::text(200, "ok"),
        "/count" => match inspect::count_entities(store, &config.kind, ctx) {
            Ok(count) => Response::ok(format, report::render_count(&count, format)),
            Err(err) => Response::failure(500, &err.into(), format),
        },
        "/count/paged" => {
            let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
            match inspect::count_entities_paged(store, &config.kind, page_size, ctx) {
                Ok(count) => Response::ok(format, report::render_count(&count, format)),
                Err(err) => Response::failure(500, &err.into(), format),
            }
        }
        "/stat" => match inspect::kind_stat(store, &config.kind, ctx) {
            Ok(stat) => Response::ok(format, report::render_stat(&stat, format)),
            Err(err @ cp_common::Error::NoKindStats { .. }) => Response::failure(404, &err, format),
            Err(err) => Response::failure(500, &err, format),
        },
        _ => Response::text(404, "not found"),
    }
}

fn run_probe<S: Datastore + ?Sized>(
    store: &S,
    config: &ProbeConfig,
    ctx: &LogContext,
    strategy: ReadStrategy,
    format: OutputFormat,
) -> Response {
    let prefix = RunPrefix::now();
    let log = TracingProbeLog::new(ctx.clone().with_run_prefix(prefix.as_str()));
    let options = ProbeOptions::from_config(config, strategy);
    let runner = ProbeRunner::new(store, &log, options);

    match runner.run(prefix) {
        Ok(result) => Response::ok(
            format,
            report::render_probe(&result, runner.options(), format),
        ),
        Err(err) => Response::failure(500, &err.into(), format),
    }
}

/// Handle to a running probe server.
pub struct ProbeServer {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    addr: SocketAddr,
}

impl ProbeServer {
    /// Bind and start accepting on a background thread.
    pub fn start<S>(
        store: Arc<S>,
        config: ProbeConfig,
        ctx: LogContext,
    ) -> Result<Self, cp_common::Error>
    where
        S: Datastore + Send + Sync + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
            .parse()
            .map_err(|e| cp_common::Error::Config(format!("invalid bind address: {}", e)))?;

        let server = tiny_http::Server::http(addr).map_err(|e| {
            cp_common::Error::Io(std::io::Error::other(format!(
                "failed to start server on {}: {}",
                addr, e
            )))
        })?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);

        log_event!(
            ctx,
            INFO,
            event_names::SERVER_STARTED,
            Stage::Serve,
            format!("listening on http://{}", addr)
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let mut config = config;
        config.server.port = addr.port();
        let config = Arc::new(config);

        let thread = thread::Builder::new()
            .name("cp-serve".to_string())
            .spawn(move || serve_loop(server, store, config, ctx, &shutdown_clone))?;

        Ok(ProbeServer {
            shutdown,
            thread: Some(thread),
            addr,
        })
    }

    /// The bound address (the real port when 0 was requested).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the accept loop exits.
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn shutdown(mut self) {
        self.stop();
        info!("probe server stopped");
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = std::net::TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ProbeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_loop<S>(
    server: tiny_http::Server,
    store: Arc<S>,
    config: Arc<ProbeConfig>,
    ctx: LogContext,
    shutdown: &AtomicBool,
) where
    S: Datastore + Send + Sync + 'static,
{
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let request = match server.recv_timeout(Duration::from_secs(1)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    log_event!(
                        ctx,
                        ERROR,
                        event_names::SERVER_ERROR,
                        Stage::Serve,
                        format!("accept failed: {}", e)
                    );
                }
                break;
            }
        };

        if shutdown.load(Ordering::SeqCst) {
            let _ = request
                .respond(tiny_http::Response::from_string("shutting down").with_status_code(503));
            break;
        }

        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        let ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name("cp-request".to_string())
            .spawn(move || handle(request, store.as_ref(), &config, &ctx));
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn request thread");
        }
    }
}

fn handle<S: Datastore + ?Sized>(
    request: tiny_http::Request,
    store: &S,
    config: &ProbeConfig,
    ctx: &LogContext,
) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    debug!(method = %method, url = %url, "request received");

    let response = route_request(store, config, ctx, &method, &url);
    log_event!(
        ctx,
        INFO,
        event_names::SERVER_REQUEST,
        Stage::Serve,
        format!("{} {} -> {}", method, url, response.status),
        status = response.status
    );

    let mut reply =
        tiny_http::Response::from_string(response.body).with_status_code(response.status);
    match format!("Content-Type: {}", response.content_type).parse::<tiny_http::Header>() {
        Ok(header) => reply = reply.with_header(header),
        Err(()) => warn!(content_type = response.content_type, "unparseable content type"),
    }
    if let Err(e) = request.respond(reply) {
        warn!(error = %e, "failed to send response");
    }
}
