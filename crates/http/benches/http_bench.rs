use std::hint::black_box;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use reactor_http::codec::{MessageParser, MessageSerializer};
use reactor_http::connection::{Connection, MessageReader, MessageWriter, ReaderConfig};
use reactor_http::protocol::{StatusLine, Version};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream replaying fixed input and swallowing output.
struct MockIO {
    read_data: Vec<u8>,
    read_pos: usize,
    written: usize,
}

impl MockIO {
    fn new(read_data: Vec<u8>) -> Self {
        Self { read_data, read_pos: 0, written: 0 }
    }
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIO {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        self.written += buf.len();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

const SIMPLE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

const CHUNKED_REQUEST: &[u8] =
    b"POST /upload HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

fn bench_message_parser(c: &mut Criterion) {
    c.bench_function("parse_simple_request", |b| {
        b.iter(|| {
            let mut parser = MessageParser::request(1024);
            black_box(parser.parse(black_box(SIMPLE_REQUEST)).unwrap());
            black_box(parser.into_message());
        });
    });

    c.bench_function("parse_chunked_request_byte_at_a_time", |b| {
        b.iter(|| {
            let mut parser = MessageParser::request(1024);
            for byte in CHUNKED_REQUEST {
                parser.parse(std::slice::from_ref(byte)).unwrap();
            }
            black_box(parser.into_message());
        });
    });
}

fn bench_message_serializer(c: &mut Criterion) {
    let body = Bytes::from_static(b"Hello World!");

    c.bench_function("serialize_response", |b| {
        b.iter(|| {
            let mut serializer = MessageSerializer::response(StatusLine::with_reason(Version::HTTP_11, 200));
            serializer.set_header("Content-Type", "text/plain");
            serializer.append(body.clone());
            serializer.finalize_headers(true, serializer.payload_size());

            let mut spans = Vec::with_capacity(2);
            serializer.head(&mut spans).unwrap();
            serializer.body(&mut spans);
            black_box(spans);
        });
    });
}

fn bench_connection(c: &mut Criterion) {
    let config = ReaderConfig { read_timeout: None, ..ReaderConfig::default() };

    c.bench_function("read_and_answer_pipelined_requests", |b| {
        b.iter(|| {
            block_on(async {
                let mut conn = Connection::new(MockIO::new(SIMPLE_REQUEST.repeat(8)));
                for _ in 0..8 {
                    let message = MessageReader::request(&config).receive(&mut conn).await.unwrap();

                    let status = StatusLine::with_reason(message.version(), 200);
                    let mut writer = MessageWriter::new(MessageSerializer::response(status));
                    writer.serializer_mut().append_static(b"Hello World!");
                    writer.send(&mut conn).await.unwrap();
                }
                black_box(conn.into_inner().written);
            });
        });
    });
}

criterion_group!(benches, bench_message_parser, bench_message_serializer, bench_connection);
criterion_main!(benches);
