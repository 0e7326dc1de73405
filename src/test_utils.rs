//! Mock upstream servers for unit tests.
//!
//! Raw TCP listeners answering with canned HTTP/1.1 responses, so decision
//! and completion clients can be exercised without the real services.

#[cfg(test)]
pub mod mock_servers {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one request: headers plus a `Content-Length` body.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buffer.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buffer);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn reason_phrase(status_code: u16) -> &'static str {
        match status_code {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    async fn write_response(stream: &mut TcpStream, status_code: u16, body: &str) {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_code,
            reason_phrase(status_code),
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.flush().await;
        let _ = stream.shutdown().await;
    }

    /// Serve a single canned response.
    ///
    /// # Returns
    /// * `String` - Server URL
    pub async fn create_mock_http_server(response_body: &str, status_code: u16) -> String {
        create_capturing_mock_server(response_body, status_code)
            .await
            .0
    }

    /// Serve a single canned response and keep the raw request it answered.
    pub async fn create_capturing_mock_server(
        response_body: &str,
        status_code: u16,
    ) -> (String, Arc<Mutex<Option<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(None));
        let captured_clone = Arc::clone(&captured);

        let response_body = response_body.to_string();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                *captured_clone.lock().unwrap() = Some(request);
                write_response(&mut stream, status_code, &response_body).await;
            }
        });

        (format!("http://127.0.0.1:{}", addr.port()), captured)
    }

    /// Serve a `text/event-stream` body written piece by piece.
    ///
    /// Each `(delay, chunk)` pair sleeps for `delay` before writing `chunk`.
    /// The connection is closed after the last chunk.
    pub async fn create_mock_sse_server(chunks: Vec<(Duration, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = read_request(&mut stream).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for (delay, chunk) in chunks {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if stream.write_all(chunk.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;
                }
                let _ = stream.shutdown().await;
            }
        });

        format!("http://127.0.0.1:{}", addr.port())
    }
}
