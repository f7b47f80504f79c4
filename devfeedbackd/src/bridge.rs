//! Browser-side bridge.
//!
//! Generates the script the dev page loads from the daemon, and injects the
//! script tag into served HTML. The script reports HMR completion back to
//! [`COMPLETION_PATH`] and streams client events over [`WS_PATH`].

use devfeedback_common::ReportKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Endpoint the browser posts `{file, clientTimestamp}` to.
pub const COMPLETION_PATH: &str = "/__timing_hmr_complete";
/// Path the client script is served from.
pub const CLIENT_MODULE_PATH: &str = "/@devfeedback/client";
/// WebSocket endpoint for client events.
pub const WS_PATH: &str = "/__devfeedback/ws";

const HEAD_CLOSE: &str = "</head>";

/// Whether the daemon runs alongside a dev server or a one-shot build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Dev,
    Build,
}

impl Mode {
    pub fn is_dev(&self) -> bool {
        matches!(self, Mode::Dev)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Dev => f.write_str("dev"),
            Mode::Build => f.write_str("build"),
        }
    }
}

/// Delivery form of the client script.
///
/// `Module` is loaded by the injected `<script type="module">` tag. Bundler
/// shims request `Runtime` and inline it as a runtime module, where the
/// CommonJS-style `module.hot` API is in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientFormat {
    #[default]
    Module,
    Runtime,
}

impl ClientFormat {
    /// Expression resolving to the bundler's hot API, or a falsy value.
    fn hot_api(&self) -> &'static str {
        match self {
            ClientFormat::Module => "import.meta.webpackHot",
            ClientFormat::Runtime => "typeof module !== 'undefined' && module.hot",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "serve" | "development" => Ok(Mode::Dev),
            "build" | "production" => Ok(Mode::Build),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

const PRELUDE: &str = r#"(function () {
  if (window.__DEVFEEDBACK__) { return; }
  var base = '__BASE__';
  var state = { cycleStart: __CYCLE_START__, ws: null, queue: [] };
  window.__DEVFEEDBACK__ = state;
  window.__BUILD_START__ = state.cycleStart;

  function elapsed() { return Date.now() - (state.cycleStart || Date.now()); }

  function send(event) {
    var frame = JSON.stringify(event);
    if (state.ws && state.ws.readyState === 1) { state.ws.send(frame); }
    else { state.queue.push(frame); }
  }

  function connect() {
    var ws = new WebSocket(base.replace(/^http/, 'ws') + '__WS_PATH__');
    ws.onopen = function () {
      while (state.queue.length) { ws.send(state.queue.shift()); }
    };
    ws.onmessage = function (msg) {
      try {
        var parsed = JSON.parse(msg.data);
        if (parsed.event === 'cycle_started' && parsed.data) {
          state.cycleStart = parsed.data.startedAt;
          window.__BUILD_START__ = state.cycleStart;
        }
      } catch (err) {
        console.error('[DevFeedback] Bad server message:', err);
      }
    };
    ws.onclose = function () { state.ws = null; setTimeout(connect, 1000); };
    state.ws = ws;
  }

  function reportUpdated(file) {
    fetch(base + '__COMPLETION_PATH__', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json', 'X-Silent': 'true' },
      body: JSON.stringify({ file: file, clientTimestamp: Date.now() })
    }).catch(function (err) { console.error('[DevFeedback] Failed to send metrics:', err); });
  }

  state.reportUpdated = reportUpdated;
  state.send = send;
  connect();
"#;

const VITE_HOOK: &str = r#"
  import(window.location.origin + '/@vite/client').then(function (client) {
    var hot = client.createHotContext('__CLIENT_MODULE_PATH__');
    if (!hot) { return; }
    hot.on('vite:afterUpdate', function (data) {
      if (!Array.isArray(data.updates)) { return; }
      data.updates.forEach(function (update) {
        if (update.path) { reportUpdated(update.path); }
      });
      send({ type: 'hmrApplied', elapsedMs: elapsed() });
    });
  }).catch(function (err) { console.error('[DevFeedback] Vite client unavailable:', err); });
"#;

const BUNDLER_HOOK: &str = r#"
  var statusTimer;
  var hot = __HOT_API__;
  if (hot) {
    hot.addStatusHandler(function (status) {
      if (status === 'idle' || status === 'ready') {
        clearTimeout(statusTimer);
        statusTimer = setTimeout(function () {
          send({ type: 'hmrApplied', elapsedMs: elapsed() });
        }, 50);
      }
    });
  }
"#;

const DOM_OBSERVER: &str = r#"
  var domTimer;
  var observer = new MutationObserver(function () {
    clearTimeout(domTimer);
    domTimer = setTimeout(function () {
      send({ type: 'domUpdated', elapsedMs: elapsed() });
    }, 50);
  });
  observer.observe(document.documentElement, {
    childList: true, subtree: true, attributes: true, characterData: true
  });
})();
"#;

/// Client script for `tool`, talking to the daemon at `base_url`.
///
/// `cycle_started_at` seeds the reference time; later cycles update it over
/// the WebSocket. `format` only changes how bundler sessions reach the hot
/// API; the vite hook works in both forms.
pub fn client_script(
    base_url: &str,
    tool: ReportKind,
    cycle_started_at: Option<i64>,
    format: ClientFormat,
) -> String {
    let base = base_url.trim_end_matches('/');
    let cycle_start = cycle_started_at
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| "null".to_string());
    let hook = if tool.is_vite() { VITE_HOOK } else { BUNDLER_HOOK };

    let mut script = String::with_capacity(PRELUDE.len() + hook.len() + DOM_OBSERVER.len());
    script.push_str(PRELUDE);
    script.push_str(hook);
    script.push_str(DOM_OBSERVER);

    script
        .replace("__BASE__", base)
        .replace("__CYCLE_START__", &cycle_start)
        .replace("__WS_PATH__", WS_PATH)
        .replace("__COMPLETION_PATH__", COMPLETION_PATH)
        .replace("__CLIENT_MODULE_PATH__", CLIENT_MODULE_PATH)
        .replace("__HOT_API__", format.hot_api())
}

/// Script tag loading the client module from the daemon.
pub fn client_script_tag(base_url: &str) -> String {
    format!(
        r#"<script type="module" src="{}{}"></script>"#,
        base_url.trim_end_matches('/'),
        CLIENT_MODULE_PATH
    )
}

/// Insert the client script tag before `</head>` in dev mode.
///
/// Build mode, and HTML without a closing head tag, pass through untouched.
pub fn inject_client_script(html: &str, base_url: &str, mode: Mode) -> String {
    if !mode.is_dev() {
        return html.to_string();
    }
    let Some(pos) = html.find(HEAD_CLOSE) else {
        return html.to_string();
    };
    let tag = client_script_tag(base_url);
    let mut out = String::with_capacity(html.len() + tag.len());
    out.push_str(&html[..pos]);
    out.push_str(&tag);
    out.push_str(&html[pos..]);
    out
}
