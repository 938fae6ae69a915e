// src/p2p_codec.rs
// ------------------------------------------------------------
// libp2p request-response codec fuer json payload
//
// Ziel
// - request und response sind Vec u8 (utf8 json)
// - kein laengenpraefix: der stream selbst begrenzt die nachricht,
//   gelesen wird bis der peer seine schreibseite schliesst
// - lesen ist auf max plus ein byte gedeckelt, der handler meldet
//   dann payload zu gross statt endlos zu puffern
//
// Autor: Marcus Schlieper, ExpChat.ai
// Historie
// - 2026-01-03 Marcus Schlieper: initiale version
// ------------------------------------------------------------

use async_trait::async_trait;
use libp2p::futures;
use libp2p::request_response::Codec;
use std::io;

pub const PROTOCOL_ID: &str = "/llama/1.0.0";

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LlamaProto;

impl AsRef<str> for LlamaProto {
    fn as_ref(&self) -> &str {
        PROTOCOL_ID
    }
}

#[derive(Debug, Clone)]
pub struct LlamaCodec {
    i_max_bytes: usize,
}

impl LlamaCodec {
    pub fn new(i_max_bytes: usize) -> Self {
        Self { i_max_bytes }
    }
}

impl Default for LlamaCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

#[async_trait]
impl Codec for LlamaCodec {
    type Protocol = LlamaProto;
    type Request = Vec<u8>;
    type Response = Vec<u8>;

    async fn read_request<T>(
        &mut self,
        _: &Self::Protocol,
        o_io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: futures::AsyncRead + Unpin + Send,
    {
        read_until_eof(o_io, self.i_max_bytes).await
    }

    async fn read_response<T>(
        &mut self,
        _: &Self::Protocol,
        o_io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: futures::AsyncRead + Unpin + Send,
    {
        read_until_eof(o_io, self.i_max_bytes).await
    }

    async fn write_request<T>(
        &mut self,
        _: &Self::Protocol,
        o_io: &mut T,
        v_data: Self::Request,
    ) -> io::Result<()>
    where
        T: futures::AsyncWrite + Unpin + Send,
    {
        write_and_close(o_io, &v_data).await
    }

    async fn write_response<T>(
        &mut self,
        _: &Self::Protocol,
        o_io: &mut T,
        v_data: Self::Response,
    ) -> io::Result<()>
    where
        T: futures::AsyncWrite + Unpin + Send,
    {
        write_and_close(o_io, &v_data).await
    }
}

// liest bis EOF, aber hoechstens i_max plus ein byte
async fn read_until_eof<T>(o_io: &mut T, i_max: usize) -> io::Result<Vec<u8>>
where
    T: futures::AsyncRead + Unpin + Send,
{
    use libp2p::futures::AsyncReadExt;

    let mut o_limited = (&mut *o_io).take((i_max as u64) + 1);
    let mut v_buf: Vec<u8> = Vec::new();
    o_limited.read_to_end(&mut v_buf).await?;
    Ok(v_buf)
}

// schreibt alles und schliesst die schreibseite,
// damit der peer sein EOF sieht
async fn write_and_close<T>(o_io: &mut T, v_data: &[u8]) -> io::Result<()>
where
    T: futures::AsyncWrite + Unpin + Send,
{
    use libp2p::futures::AsyncWriteExt;

    o_io.write_all(v_data).await?;
    o_io.flush().await?;
    o_io.close().await?;
    Ok(())
}
