//! Shared fixtures for integration tests
//!
//! Synthetic product photos and a minimal HTTP responder, so no test needs
//! network access or checked-in assets.

#![allow(dead_code)]

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imgly_studio::{ImageIOService, RasterBuffer};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

pub const PRODUCT_COLOR: [u8; 3] = [150, 60, 20];

/// Dark rectangle on a white studio sweep
pub fn product_on_white(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x >= width / 4 && x < 3 * width / 4 && y >= height / 5 && y < 4 * height / 5 {
            Rgb(PRODUCT_COLOR)
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// Same rectangle as an already isolated cutout
pub fn product_cutout(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if x >= width / 4 && x < 3 * width / 4 && y >= height / 5 && y < 4 * height / 5 {
            let [r, g, b] = PRODUCT_COLOR;
            Rgba([r, g, b, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

pub fn png_bytes_rgb(image: RgbImage) -> Vec<u8> {
    ImageIOService::to_png_bytes(&RasterBuffer::from_rgb(image)).expect("encode fixture")
}

pub fn png_bytes_rgba(image: RgbaImage) -> Vec<u8> {
    ImageIOService::to_png_bytes(&RasterBuffer::from_rgba(image)).expect("encode fixture")
}

/// Count pixels matching `predicate`
pub fn count_pixels(image: &RgbaImage, predicate: impl Fn(&Rgba<u8>) -> bool) -> usize {
    image.pixels().filter(|p| predicate(p)).count()
}

/// Canned HTTP response served to every connection
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl CannedResponse {
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: b"nope".to_vec(),
        }
    }
}

/// Start a local HTTP server answering every request with `response`
///
/// Returns the base URL (`http://127.0.0.1:PORT`).
pub async fn serve(response: CannedResponse) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                drain_request(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 {} Test\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    response.status,
                    response.content_type,
                    response.body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&response.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Read the request head and any body announced by Content-Length
async fn drain_request(socket: &mut tokio::net::TcpStream) {
    let mut received = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&received[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body_read = received.len() - header_end;
    while body_read < content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => body_read += n,
        }
    }
}
