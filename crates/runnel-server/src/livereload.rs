//! WebSocket-based live reload.

use runnel_pipeline::Notifier;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the live reload WebSocket.
pub const SOCKET_PATH: &str = "/__livereload";

/// Path the client script is served from.
pub const SCRIPT_PATH: &str = "/__livereload.js";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected browsers.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Send a message to all connected browsers.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected browsers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ReloadHub {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!("[{}] {}", title, message);
        self.send(ReloadMessage::Reload);
    }
}

/// Insert the client script tag before the closing `</body>`, or at the
/// end of documents without one.
pub fn inject_reload_script(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", SCRIPT_PATH);
    let lower = html.to_ascii_lowercase();

    match lower.rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..index]);
            out.push_str(&tag);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

/// Browser side: reload on `reload`, and reconnect with backoff when the
/// server goes away, reloading once it is back.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  'use strict';

  var attempts = 0;

  function connect() {
    var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
    var ws = new WebSocket(protocol + location.host + '/__livereload');

    ws.onopen = function () {
      if (attempts > 0) {
        location.reload();
      }
      attempts = 0;
    };

    ws.onmessage = function (event) {
      var msg = JSON.parse(event.data);
      if (msg.type === 'reload') {
        location.reload();
      }
    };

    ws.onclose = function () {
      if (attempts < 10) {
        attempts++;
        setTimeout(connect, 1000 * attempts);
      }
    };
  }

  connect();
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        assert_eq!(rx.try_recv().unwrap(), ReloadMessage::Reload);
    }

    #[test]
    fn notifying_triggers_a_reload() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.notify("views", "Views compiled");

        assert_eq!(rx.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn serializes_messages() {
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Connected).unwrap(),
            r#"{"type":"connected"}"#
        );
    }

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";

        assert_eq!(
            inject_reload_script(html),
            "<html><BODY><p>hi</p><script src=\"/__livereload.js\"></script></BODY></html>"
        );
    }

    #[test]
    fn appends_without_body() {
        assert_eq!(
            inject_reload_script("<p>fragment</p>"),
            "<p>fragment</p><script src=\"/__livereload.js\"></script>"
        );
    }

    #[test]
    fn client_uses_socket_path() {
        assert!(CLIENT_SCRIPT.contains(SOCKET_PATH));
    }
}
