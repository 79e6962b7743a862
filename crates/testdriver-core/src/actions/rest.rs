//! `RestAction`: issue one HTTP request and check the status code.

use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;
use reqwest::blocking::Client;
use reqwest::Method;
use std::time::Duration;

struct RestAction {
    url: String,
    method: Method,
    body: Option<String>,
    content_type: String,
    expected_status: Option<u16>,
    timeout: Duration,
    body_var: Option<String>,
    status_var: Option<String>,
}

pub fn rest_action(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let url = p.required("url")?;
    let raw_method = p.optional("method").unwrap_or_else(|| "GET".to_string());
    let method = Method::from_bytes(raw_method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| p.invalid("method", &raw_method))?;
    let expected_status = p.parse_optional::<u16>("expected_status")?;
    let timeout_seconds: u64 = p.parse_or("timeout_seconds", 30)?;
    Ok(Box::new(RestAction {
        url,
        method,
        body: p.optional("body"),
        content_type: p
            .optional("content_type")
            .unwrap_or_else(|| "application/json".to_string()),
        expected_status,
        timeout: Duration::from_secs(timeout_seconds),
        body_var: p.optional("body_var"),
        status_var: p.optional("status_var"),
    }))
}

impl ActionKind for RestAction {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let url = ctx.resolve(&self.url);
        let client = Client::builder().timeout(self.timeout).build()?;
        let mut request = client.request(self.method.clone(), &url);
        if let Some(body) = &self.body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, self.content_type.as_str())
                .body(ctx.resolve(body));
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        ctx.detail(&format!("{} {url} -> {}", self.method, status.as_u16()));

        if let Some(name) = &self.status_var {
            ctx.store().store(name.clone(), i64::from(status.as_u16()));
        }
        if let Some(name) = &self.body_var {
            ctx.store().store(name.clone(), body.clone());
        }

        let ok = match self.expected_status {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        if !ok {
            let expected = self
                .expected_status
                .map_or_else(|| "2xx".to_string(), |s| s.to_string());
            return Err(DriverError::ActionFailed(format!(
                "{} {url} returned {}, expected {expected}",
                self.method,
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::action::{ActionConfig, Outcome};
    use crate::actions::testing::{build, runtime};
    use crate::config::DriverConfig;
    use crate::error::DriverError;
    use crate::registry::default_registry;

    #[test]
    fn get_stores_body_and_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("ready")
            .create();

        let rt = runtime();
        let mut action = build(
            ActionConfig::new("r1", "RestAction", "t1")
                .with_param("url", &format!("{}/health", server.url()))
                .with_param("body_var", "health")
                .with_param("status_var", "health_status"),
        );
        assert!(action.execute(&rt));
        mock.assert();
        assert_eq!(*rt.store.get_as::<String>("health").unwrap(), "ready");
        assert_eq!(*rt.store.get_as::<i64>("health_status").unwrap(), 200);
    }

    #[test]
    fn post_sends_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/queues")
            .match_header("content-type", "application/json")
            .match_body(r#"{"name":"q1"}"#)
            .with_status(201)
            .create();

        let rt = runtime();
        let mut action = build(
            ActionConfig::new("r1", "RestAction", "t1")
                .with_param("url", &format!("{}/queues", server.url()))
                .with_param("method", "post")
                .with_param("body", r#"{"name":"q1"}"#)
                .with_param("expected_status", "201"),
        );
        assert!(action.execute(&rt));
        mock.assert();
    }

    #[test]
    fn server_error_fails() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/broken").with_status(500).create();

        let rt = runtime();
        let mut action = build(
            ActionConfig::new("r1", "RestAction", "t1")
                .with_param("url", &format!("{}/broken", server.url())),
        );
        assert!(!action.execute(&rt));
        match action.outcome() {
            Outcome::Failed { reason } => assert!(reason.contains("returned 500")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn bad_expected_status_is_rejected_at_build() {
        let config = ActionConfig::new("r1", "RestAction", "t1")
            .with_param("url", "http://localhost")
            .with_param("expected_status", "ok");
        let err = default_registry()
            .build(&config, &DriverConfig::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameter { ref param, .. } if param == "expected_status"));
    }
}
