use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serialbook::transport::{Fetched, RequestIdentity, Transport};

/// Serves canned responses by exact URL and records every request.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Fetched>>,
    requests: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn html(&self, url: &str, body: &str) {
        self.respond(url, 200, Some("text/html; charset=utf-8"), body.as_bytes());
    }

    pub fn respond(&self, url: &str, status: u16, content_type: Option<&str>, body: &[u8]) {
        self.routes.lock().expect("routes lock").insert(
            url.to_owned(),
            Fetched {
                status,
                content_type: content_type.map(str::to_owned),
                body: body.to_vec(),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _identity: &RequestIdentity) -> anyhow::Result<Fetched> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_owned());
        let routes = self.routes.lock().expect("routes lock");
        Ok(routes.get(url).cloned().unwrap_or(Fetched {
            status: 404,
            content_type: None,
            body: b"not found".to_vec(),
        }))
    }
}

/// A table of contents in the current ncode layout listing `episodes` as
/// `(path, title)` pairs.
#[allow(dead_code)]
pub fn narou_toc(title: &str, episodes: &[(&str, &str)], last_page: Option<u32>) -> String {
    let mut html = format!(
        "<html><body>\n<h1 class=\"p-novel__title\">{title}</h1>\n\
         <div class=\"p-novel__author\">作者：<a href=\"/u/1\">山田太郎</a></div>\n\
         <div id=\"novel_ex\" class=\"p-novel__summary\">あらすじ</div>\n<div class=\"p-eplist\">\n"
    );
    for (index, (path, episode)) in episodes.iter().enumerate() {
        html.push_str(&format!(
            "<div class=\"p-eplist__sublist\"><a href=\"{path}\">{episode}</a>\
             <div class=\"p-eplist__update\">2024/01/{:02} 10:00</div></div>\n",
            index + 1
        ));
    }
    html.push_str("</div>\n");
    if let Some(last) = last_page {
        html.push_str(&format!(
            "<div class=\"c-pager\"><a class=\"c-pager__item c-pager__item--last\" href=\"/n1/?p={last}\">最後へ</a></div>\n"
        ));
    }
    html.push_str("</body></html>\n");
    html
}

#[allow(dead_code)]
pub fn narou_episode(title: &str, body: &str) -> String {
    format!(
        "<html><body>\n<h1 class=\"p-novel__title\">{title}</h1>\n\
         <div class=\"js-novel-text p-novel__text\">{body}</div>\n</body></html>\n"
    )
}

#[allow(dead_code)]
pub struct ImageServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ImageServer {
    /// Serves `/ok.png` as a one-pixel PNG; every other path fails with 500.
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let response = if request.url() == "/ok.png" {
                    let header =
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"image/png"[..])
                            .expect("build header");
                    tiny_http::Response::from_data(PIXEL_PNG.to_vec()).with_header(header)
                } else {
                    tiny_http::Response::from_data(b"broken".to_vec()).with_status_code(500)
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for ImageServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub static PIXEL_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];
