use super::extract::{PageExtractor, RegexExtractor};
use super::{has_field, set_field, Ack, ActionGateway, PreparedAction};
use crate::error::{EngineError, GateError, GatewayError};
use crate::gate::CaptchaGate;
use crate::pacing::Pacing;
use futures::future::BoxFuture;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use volley_core::types::{ActionKind, ActionRequest, Target};
use volley_core::world::WorldMap;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Rally point form on both the order and the confirmation page.
const COMMAND_FORM: &str = "command-data-form";

/// Tokens refreshed from every response and attached to the next request.
#[derive(Debug, Default, Clone)]
struct WebSession {
    csrf: Option<String>,
    referer: Option<String>,
    h: Option<String>,
}

struct Call {
    method: Method,
    url: Url,
    form: Option<Vec<(String, String)>>,
    ajax: bool,
}

impl Call {
    fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: None,
            ajax: false,
        }
    }

    fn post(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            form: Some(form),
            ajax: false,
        }
    }

    fn ajax(mut self) -> Self {
        self.ajax = true;
        self
    }
}

/// Gateway speaking the game's HTML forms and popup API.
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
    gate: Arc<CaptchaGate>,
    pacing: Arc<Pacing>,
    map: WorldMap,
    extractor: Box<dyn PageExtractor>,
    web: Mutex<WebSession>,
}

impl HttpGateway {
    /// `cookie` is a browser cookie header (`name=value; name2=value2`).
    pub fn new(
        endpoint: &str,
        cookie: Option<&str>,
        map: WorldMap,
        gate: Arc<CaptchaGate>,
        pacing: Arc<Pacing>,
    ) -> crate::Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|_| EngineError::InvalidEndpoint(endpoint.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(EngineError::InvalidEndpoint(endpoint.to_string()));
        }
        let jar = Arc::new(Jar::default());
        for part in cookie.unwrap_or_default().split(';') {
            let part = part.trim();
            if !part.is_empty() {
                jar.add_cookie_str(part, &base);
            }
        }
        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base,
            gate,
            pacing,
            map,
            extractor: Box::new(RegexExtractor),
            web: Mutex::new(WebSession::default()),
        })
    }

    pub fn with_extractor(mut self, extractor: impl PageExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn gate(&self) -> &CaptchaGate {
        &self.gate
    }

    fn url(&self, params: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let mut url = self
            .base
            .join("game.php")
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    fn session(&self) -> WebSession {
        self.web.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Refresh referer, CSRF and `h` from a response.
    fn absorb(&self, url: &Url, body: &str) {
        let csrf = self.extractor.csrf_token(body);
        let h = self.extractor.freshness_token(body);
        let mut web = self.web.lock().unwrap_or_else(|e| e.into_inner());
        web.referer = Some(url.to_string());
        // A page without a token means the next call goes out without one.
        web.csrf = csrf;
        if h.is_some() {
            web.h = h;
        }
    }

    /// Issue one logical call: pace, wait for an Open gate, send, and retry
    /// after clearance when the answer is a challenge.
    async fn exchange(&self, call: &Call) -> Result<String, GatewayError> {
        loop {
            self.pacing
                .pace()
                .await
                .map_err(|_| GatewayError::Gate(GateError::Cancelled))?;
            // After pacing: the gate may have closed while this call slept.
            self.gate.wait_open().await?;

            let web = self.session();
            let mut rb = self.client.request(call.method.clone(), call.url.clone());
            if let Some(referer) = &web.referer {
                rb = rb.header(REFERER, referer);
            }
            if let Some(csrf) = &web.csrf {
                rb = rb.header("X-CSRF-Token", csrf);
            }
            if call.ajax {
                rb = rb
                    .header(ACCEPT, "application/json, text/javascript, */*; q=0.01")
                    .header("X-Requested-With", "XMLHttpRequest")
                    .header("TribalWars-Ajax", "1");
            }
            if let Some(form) = &call.form {
                rb = rb.form(form);
            }

            tracing::debug!(method = %call.method, url = %call.url, "request");
            let resp = rb.send().await?;
            let status = resp.status();
            let final_url = resp.url().clone();
            let body = resp.text().await?;

            if self.gate.detect(&body) {
                tracing::warn!(url = %call.url, "challenge in response, call will be retried");
                self.gate.trip().await?;
                continue;
            }
            self.absorb(&final_url, &body);

            return match status {
                s if s.is_success() => Ok(body),
                StatusCode::NOT_FOUND => Err(GatewayError::NotFound(call.url.to_string())),
                s => Err(GatewayError::Transport(format!("HTTP {s} from {}", call.url))),
            };
        }
    }

    /// Open the rally point, fill the order, and read the confirmation.
    pub async fn prepare_order(&self, req: &ActionRequest) -> Result<PreparedAction, GatewayError> {
        let pos = self.map.resolve(&req.target).ok_or_else(|| {
            GatewayError::NotFound(format!("target {} is not on the map", req.target))
        })?;
        let (x, y) = (pos.x.to_string(), pos.y.to_string());

        let mut params = vec![("village", req.origin.as_str()), ("screen", "place")];
        if req.kind == ActionKind::Support {
            params.push(("mode", "support"));
        }
        if let Target::Village { id } = &req.target {
            params.push(("target", id.as_str()));
        }
        let page = self.exchange(&Call::get(self.url(&params)?)).await?;

        let mut form = self.extractor.form_inputs(&page, COMMAND_FORM);
        if form.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "no rally point form for village {}",
                req.origin
            )));
        }
        for (unit, qty) in req.units() {
            set_field(&mut form, unit, qty.to_string());
        }
        set_field(&mut form, "x", x.as_str());
        set_field(&mut form, "y", y.as_str());
        set_field(&mut form, "target_type", "coord");
        set_field(&mut form, req.kind.as_str(), "l");

        let confirm_url = self.url(&[
            ("village", req.origin.as_str()),
            ("screen", "place"),
            ("try", "confirm"),
        ])?;
        let confirm = self.exchange(&Call::post(confirm_url, form)).await?;

        if let Some(reason) = self.extractor.error_box(&confirm) {
            return Err(GatewayError::Infeasible(reason));
        }
        let duration = self.extractor.duration(&confirm).ok_or_else(|| {
            GatewayError::Rejected("confirmation page carries no travel duration".to_string())
        })?;

        let mut confirm_form = self.extractor.form_inputs(&confirm, COMMAND_FORM);
        if confirm_form.is_empty() {
            return Err(GatewayError::Rejected(
                "confirmation page has no order form".to_string(),
            ));
        }
        confirm_form.retain(|(k, _)| k != "support");
        if req.kind == ActionKind::Support {
            set_field(&mut confirm_form, "support", "1");
        }
        set_field(&mut confirm_form, "building", "main");
        if let Some(h) = self.session().h {
            set_field(&mut confirm_form, "h", h);
        }
        if !has_field(&confirm_form, "x") {
            set_field(&mut confirm_form, "x", x);
        }
        if !has_field(&confirm_form, "y") {
            set_field(&mut confirm_form, "y", y);
        }

        tracing::debug!(id = %req.id, duration_secs = duration.as_secs(), "order confirmed");
        Ok(PreparedAction {
            request_id: req.id.clone(),
            origin: req.origin.clone(),
            kind: req.kind,
            form: confirm_form,
            duration,
        })
    }

    /// Fire a confirmed order through the popup command API.
    pub async fn submit_order(&self, prepared: &PreparedAction) -> Result<Ack, GatewayError> {
        let url = self.url(&[
            ("ajaxaction", "popup_command"),
            ("village", prepared.origin.as_str()),
            ("screen", "place"),
        ])?;
        let mut form = prepared.form.clone();
        if !has_field(&form, "h") {
            if let Some(h) = self.session().h {
                form.push(("h".to_string(), h));
            }
        }
        let body = self.exchange(&Call::post(url, form).ajax()).await?;

        let json: Value = serde_json::from_str(&body).map_err(|_| {
            GatewayError::Rejected("command API answered with something other than JSON".into())
        })?;
        if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
            let reason = match error {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
                other => other.to_string(),
            };
            return Err(GatewayError::Rejected(reason));
        }
        let message = json
            .pointer("/response/message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Ack {
            request_id: prepared.request_id.clone(),
            message,
        })
    }
}

impl ActionGateway for HttpGateway {
    fn prepare<'a>(
        &'a self,
        request: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<PreparedAction, GatewayError>> {
        Box::pin(self.prepare_order(request))
    }

    fn submit<'a>(&'a self, prepared: &'a PreparedAction) -> BoxFuture<'a, Result<Ack, GatewayError>> {
        Box::pin(self.submit_order(prepared))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
