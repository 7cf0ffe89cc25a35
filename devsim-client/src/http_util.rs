use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Method, Request, Response, Uri, header, request, response};
use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, lookup_host},
};
use tokio_native_tls::{TlsConnector as TokioTlsConnector, native_tls::TlsConnector};

/// Responses larger than this are dropped instead of buffered.
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin {}
impl<T: AsyncRead + AsyncWrite + Unpin> AsyncReadWrite for T {}

pub fn basic_request_builder(uri: &str, method: Method) -> anyhow::Result<request::Builder> {
    let uri = uri.parse::<Uri>()?;
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?
        .as_str();
    let host = authority
        .find('@')
        .map(|idx| authority.split_at(idx + 1).1)
        .unwrap_or(authority);

    if host.is_empty() {
        anyhow::bail!("URL error: empty host name");
    }

    let req = Request::builder()
        .method(method)
        .header(header::HOST, host)
        .header(header::CONNECTION, "close")
        .header(header::ACCEPT_ENCODING, "identity")
        .uri(&uri);

    Ok(req)
}

/// Sends one request on a fresh connection and reads the response until the
/// server closes it.
pub async fn send_http_request<T: AsRef<[u8]>>(req: Request<T>) -> anyhow::Result<Response<Bytes>> {
    let mut stream = connect(req.uri()).await?;

    stream.write_all(&assemble_http_request(req)?).await?;
    stream.flush().await?;

    let buffer = read_to_end_limited(&mut stream, MAX_RESPONSE_SIZE).await?;
    trace!("Response: {:?}", String::from_utf8_lossy(&buffer));
    parse_http_response(buffer)
}

async fn read_to_end_limited<R: AsyncRead + Unpin + ?Sized>(
    stream: &mut R,
    limit: usize,
) -> anyhow::Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(512);
    while stream.read_buf(&mut buffer).await? != 0 {
        if buffer.len() > limit {
            anyhow::bail!("HTTP error: response exceeds {limit} bytes");
        }
    }
    Ok(buffer.freeze())
}

async fn connect(uri: &Uri) -> anyhow::Result<Box<dyn AsyncReadWrite>> {
    let tls = match uri.scheme_str() {
        Some("https") => true,
        Some("http") | None => false,
        Some(other) => anyhow::bail!("URL error: unsupported scheme {other}"),
    };
    let host = uri
        .host()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?;
    let host = if host.starts_with('[') {
        // IPv6 address
        &host[1..host.len() - 1]
    } else {
        host
    };
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    debug!("looking up address information for ({host}, {port})");
    let mut stream = None;
    for addr in lookup_host((host, port)).await? {
        trace!("trying to contact {uri} at {addr}...");
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => trace!("connection attempt to {addr} failed: {e}"),
        }
    }
    let stream = stream.ok_or_else(|| anyhow::anyhow!("I/O error: unable to connect {uri}"))?;

    if tls {
        let connector = TokioTlsConnector::from(TlsConnector::new()?);
        Ok(Box::new(connector.connect(host, stream).await?))
    } else {
        Ok(Box::new(stream))
    }
}

fn assemble_http_request<T: AsRef<[u8]>>(req: Request<T>) -> anyhow::Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(256);

    buffer.put_slice(
        format!(
            "{} {} {:?}\r\n",
            req.method(),
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/"),
            req.version()
        )
        .as_bytes(),
    );

    for (name, value) in req.headers() {
        buffer.put_slice(name.as_str().as_bytes());
        buffer.put_slice(b": ");
        buffer.put(value.as_bytes());
        buffer.put_slice(b"\r\n");
    }

    buffer.put_slice(b"\r\n");

    buffer.put_slice(req.body().as_ref());

    trace!("Request: {:?}", String::from_utf8_lossy(&buffer));

    Ok(buffer.freeze())
}

fn parse_http_response(bytes: Bytes) -> anyhow::Result<Response<Bytes>> {
    const MAX_HEADERS: usize = 64;
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);

    let status = resp.parse(&bytes)?;

    if status.is_partial() {
        anyhow::bail!("HTTP error: response is incomplete");
    }

    let body_start_index = status.unwrap();

    let mut response_builder = response::Builder::new()
        .status(resp.code.unwrap_or(200))
        .version(match resp.version.unwrap_or(1) {
            0 => http::Version::HTTP_10,
            _ => http::Version::HTTP_11,
        });

    let mut chunked = false;
    for header in resp.headers.iter() {
        if header.name.eq_ignore_ascii_case(header::TRANSFER_ENCODING.as_str()) {
            chunked |= String::from_utf8_lossy(header.value)
                .to_ascii_lowercase()
                .contains("chunked");
        }
        response_builder = response_builder.header(header.name, header.value);
    }

    let body = bytes.slice(body_start_index..);
    let body = if chunked { decode_chunked(body)? } else { body };

    Ok(response_builder.body(body)?)
}

fn decode_chunked(mut body: Bytes) -> anyhow::Result<Bytes> {
    let mut decoded = BytesMut::with_capacity(body.len());

    loop {
        let (start, size) = match httparse::parse_chunk_size(&body) {
            Ok(httparse::Status::Complete(found)) => found,
            Ok(httparse::Status::Partial) => anyhow::bail!("HTTP error: chunk is incomplete"),
            Err(_) => anyhow::bail!("HTTP error: invalid chunk size"),
        };
        let size = usize::try_from(size)?;
        if size == 0 {
            return Ok(decoded.freeze());
        }

        // chunk data is followed by CRLF
        let end = start
            .checked_add(size)
            .filter(|end| end.checked_add(2).is_some_and(|e| e <= body.len()))
            .ok_or_else(|| anyhow::anyhow!("HTTP error: chunk is incomplete"))?;
        decoded.put_slice(&body[start..end]);
        body.advance(end + 2);
    }
}
