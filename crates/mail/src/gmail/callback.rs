//! Loopback redirect listener for the OAuth authorization code flow
//!
//! A one-shot HTTP endpoint on the redirect URI's port. It runs on a
//! background thread and reports exactly one terminal event (a code or an
//! error) over a channel. The caller waits with a deadline; on timeout the
//! listener is told to stop and is joined, so an abandoned consent attempt
//! never leaves a socket open.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use url::Url;

use super::oauth::{AuthorizationCode, ConsentFlow, authorization_url, random_state};
use crate::config::{ClientConfig, Settings};
use crate::error::{Error, Result};

/// How often the accept loop checks for a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Per-connection read timeout
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Port range to try when the redirect URI has no explicit port
const PORT_RANGE_START: u16 = 8080;
const PORT_RANGE_END: u16 = 8090;

/// Terminal event delivered by the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The provider granted consent
    Code { code: String, state: Option<String> },
    /// The provider (or the operator) refused, or the request was forged
    Denied(String),
}

/// Consent flow that opens the system browser and listens on localhost
#[derive(Debug, Clone)]
pub struct LoopbackConsent {
    timeout: Duration,
    grace: Duration,
    open_browser: bool,
}

impl LoopbackConsent {
    pub fn new(timeout: Duration, grace: Duration, open_browser: bool) -> Self {
        Self {
            timeout,
            grace,
            open_browser,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.callback_timeout(),
            settings.callback_grace(),
            settings.open_browser,
        )
    }
}

impl ConsentFlow for LoopbackConsent {
    fn obtain_code(&self, config: &ClientConfig) -> Result<AuthorizationCode> {
        let (listener, redirect_uri, path) = bind_redirect(&config.redirect_uri)?;
        let state = random_state();
        let auth_url = authorization_url(config, &redirect_uri, &state);

        log::info!("Authorization required; visit: {}", auth_url);
        if self.open_browser
            && let Err(e) = open::that(&auth_url)
        {
            log::warn!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        log::info!("Waiting for authorization on {}", redirect_uri);
        match wait_for_callback(listener, &path, Some(&state), self.timeout, self.grace)? {
            CallbackOutcome::Code { code, .. } => Ok(AuthorizationCode { code, redirect_uri }),
            CallbackOutcome::Denied(reason) => Err(Error::Callback(reason)),
        }
    }
}

/// Bind the listener for a redirect URI
///
/// Returns the listener, the redirect URI to send to the provider and the
/// path the callback must arrive on.
fn bind_redirect(redirect_uri: &str) -> Result<(TcpListener, String, String)> {
    let url = Url::parse(redirect_uri).map_err(|e| Error::ConfigMalformed {
        path: redirect_uri.into(),
        reason: format!("invalid redirect URI: {e}"),
    })?;
    let path = url.path().to_string();

    if let Some(port) = explicit_port(redirect_uri, &url) {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        return Ok((listener, redirect_uri.to_string(), path));
    }

    for port in PORT_RANGE_START..=PORT_RANGE_END {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            let mut bound = url.clone();
            // Only fails for URLs that cannot carry a port, which Url::parse rejected above
            let _ = bound.set_port(Some(port));
            let uri = bound.as_str().trim_end_matches('/').to_string();
            return Ok((listener, uri, path));
        }
    }

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        format!(
            "could not bind to any port in range {}-{}",
            PORT_RANGE_START, PORT_RANGE_END
        ),
    )))
}

/// Port written in the redirect URI, including a scheme's default port
///
/// `Url` drops a default port such as `:80` when parsing, so the raw
/// authority is checked for one.
fn explicit_port(redirect_uri: &str, url: &Url) -> Option<u16> {
    if let Some(port) = url.port() {
        return Some(port);
    }
    let rest = redirect_uri.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    match after_host.rsplit_once(':') {
        Some((_, port)) if !port.is_empty() => url.port_or_known_default(),
        _ => None,
    }
}

/// Serve the redirect endpoint until one terminal event or `timeout`
///
/// Requests on other paths (e.g. `/favicon.ico`) get a 404 and do not end
/// the wait. After a terminal event the browser gets `grace` to render the
/// confirmation page before the socket is closed.
pub(crate) fn wait_for_callback(
    listener: TcpListener,
    expected_path: &str,
    expected_state: Option<&str>,
    timeout: Duration,
    grace: Duration,
) -> Result<CallbackOutcome> {
    listener.set_nonblocking(true)?;

    let (tx, rx) = mpsc::channel::<std::io::Result<CallbackOutcome>>();
    let stop = Arc::new(AtomicBool::new(false));
    let expected_path = expected_path.to_string();
    let expected_state = expected_state.map(str::to_string);

    let worker = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        match handle_connection(stream, &expected_path, expected_state.as_deref()) {
                            Ok(Some((outcome, stream))) => {
                                let _ = tx.send(Ok(outcome));
                                thread::sleep(grace);
                                drop(stream);
                                return;
                            }
                            Ok(None) => {}
                            Err(e) => log::debug!("Ignoring malformed callback request: {}", e),
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
        })
    };

    let received = rx.recv_timeout(timeout);
    stop.store(true, Ordering::SeqCst);
    if worker.join().is_err() {
        log::warn!("Callback listener thread panicked");
    }

    match received {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Callback(format!(
            "no authorization received within {}s",
            timeout.as_secs()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Callback(
            "callback listener stopped unexpectedly".to_string(),
        )),
    }
}

/// Answer one HTTP request; returns the outcome (and the still-open stream)
/// when the request was a terminal callback
fn handle_connection(
    mut stream: TcpStream,
    expected_path: &str,
    expected_state: Option<&str>,
) -> std::io::Result<Option<(CallbackOutcome, TcpStream)>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain headers so the browser sees a clean close
    let mut line = String::new();
    while reader.read_line(&mut line)? > 0 && line != "\r\n" && line != "\n" {
        line.clear();
    }

    // Format: GET /?code=AUTH_CODE&scope=... HTTP/1.1
    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
        respond(&mut stream, "400 Bad Request", "Malformed request.")?;
        return Ok(None);
    };

    if url.path() != expected_path {
        respond(&mut stream, "404 Not Found", "Not found.")?;
        return Ok(None);
    }

    let param = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };
    let state = param("state");

    let outcome = if let Some(error) = param("error") {
        CallbackOutcome::Denied(format!("OAuth error: {error}"))
    } else if let Some(code) = param("code") {
        match expected_state {
            Some(expected) if state.as_deref() != Some(expected) => {
                CallbackOutcome::Denied("state parameter mismatch".to_string())
            }
            _ => CallbackOutcome::Code { code, state },
        }
    } else {
        respond(&mut stream, "400 Bad Request", "Missing authorization code.")?;
        return Ok(None);
    };

    // Send response to browser
    match &outcome {
        CallbackOutcome::Code { .. } => respond(
            &mut stream,
            "200 OK",
            "Authentication successful! You can close this window.",
        )?,
        CallbackOutcome::Denied(_) => respond(
            &mut stream,
            "400 Bad Request",
            "Authentication failed. Please try again.",
        )?,
    }

    Ok(Some((outcome, stream)))
}

fn respond(stream: &mut TcpStream, status: &str, message: &str) -> std::io::Result<()> {
    let body = format!("<html><body><h1>{}</h1></body></html>", message);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn local_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn send_request(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_code_received() {
        let (listener, port) = local_listener();
        let browser = thread::spawn(move || send_request(port, "/?code=4%2Fabc&state=xyz"));

        let outcome = wait_for_callback(
            listener,
            "/",
            Some("xyz"),
            Duration::from_secs(5),
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(
            outcome,
            CallbackOutcome::Code {
                code: "4/abc".to_string(),
                state: Some("xyz".to_string())
            }
        );
        let page = browser.join().unwrap();
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert!(page.contains("Authentication successful"));
    }

    #[test]
    fn test_error_reported() {
        let (listener, port) = local_listener();
        let browser = thread::spawn(move || send_request(port, "/?error=access_denied"));

        let outcome =
            wait_for_callback(listener, "/", None, Duration::from_secs(5), Duration::ZERO).unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Denied("OAuth error: access_denied".to_string())
        );
        assert!(browser.join().unwrap().starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn test_state_mismatch_denied() {
        let (listener, port) = local_listener();
        let browser = thread::spawn(move || send_request(port, "/?code=abc&state=forged"));

        let outcome = wait_for_callback(
            listener,
            "/",
            Some("expected"),
            Duration::from_secs(5),
            Duration::ZERO,
        )
        .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Denied(_)));
        browser.join().unwrap();
    }

    #[test]
    fn test_unrelated_paths_do_not_end_wait() {
        let (listener, port) = local_listener();
        let browser = thread::spawn(move || {
            let favicon = send_request(port, "/favicon.ico");
            let callback = send_request(port, "/callback?code=ok");
            (favicon, callback)
        });

        let outcome = wait_for_callback(
            listener,
            "/callback",
            None,
            Duration::from_secs(5),
            Duration::ZERO,
        )
        .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Code { ref code, .. } if code == "ok"));

        let (favicon, _) = browser.join().unwrap();
        assert!(favicon.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_timeout_releases_port() {
        let (listener, port) = local_listener();
        let err = wait_for_callback(
            listener,
            "/",
            None,
            Duration::from_millis(100),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Callback(_)));

        // The listener was torn down, so the port can be bound again
        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[test]
    fn test_explicit_default_port_is_kept() {
        let port_of = |uri: &str| explicit_port(uri, &Url::parse(uri).unwrap());
        assert_eq!(port_of("http://localhost:80/cb"), Some(80));
        assert_eq!(port_of("http://127.0.0.1:80"), Some(80));
        assert_eq!(port_of("http://[::1]:80/cb"), Some(80));
        assert_eq!(port_of("http://localhost:8085/cb"), Some(8085));
        assert_eq!(port_of("http://localhost/cb"), None);
        assert_eq!(port_of("http://localhost"), None);
        assert_eq!(port_of("http://[::1]/cb"), None);
        assert_eq!(port_of("http://localhost:/cb"), None);
    }

    #[test]
    fn test_bind_redirect_with_explicit_port() {
        let (reserved, port) = local_listener();
        drop(reserved);

        let uri = format!("http://localhost:{}/oauth2callback", port);
        let (_listener, redirect_uri, path) = bind_redirect(&uri).unwrap();
        assert_eq!(redirect_uri, uri);
        assert_eq!(path, "/oauth2callback");
    }
}
