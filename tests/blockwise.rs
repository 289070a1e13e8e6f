// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! End-to-end blockwise transfer tests (RFC 7959), both directions.

use coap_endpoint::message::codec;
use coap_endpoint::prelude::*;
use coap_endpoint::transport::{ChannelNetwork, ChannelTransport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn client(network: &ChannelNetwork) -> Arc<Endpoint<ChannelTransport>> {
    let client = Arc::new(Endpoint::new(network.join("cli", "client")));
    tokio::spawn(client.clone().run());
    client
}

#[tokio::test]
async fn block1_upload_reassembles() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    let invocations = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let invocations = invocations.clone();
        let received = received.clone();
        server.add_route("/u", move |req| {
            invocations.fetch_add(1, Ordering::SeqCst);
            *received.lock().unwrap() = req.payload.clone();
            Ok(req.make_reply(MsgCode::CHANGED, Vec::new()))
        });
    }
    tokio::spawn(server.clone().run());
    let client = client(&network);

    let body = pattern(2500);
    let mut req = Message::request(MsgType::Con, MsgCode::PUT, "/u");
    req.payload = body.clone();

    let options = SendOptions::new().with_block_size(1024);
    let rsp = client.send("server", req, &options).await.unwrap().unwrap();

    assert_eq!(MsgCode::CHANGED, rsp.msg_code);
    // ceil(2500 / 1024) fragments crossed the wire.
    assert_eq!(3, client.transport().sent_count());
    assert_eq!(1, invocations.load(Ordering::SeqCst));
    assert_eq!(body, *received.lock().unwrap());
}

#[tokio::test]
async fn block2_download_reassembles() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    let body = pattern(3000);
    {
        let body = body.clone();
        server.add_route("/big", move |req| {
            Ok(req.make_reply(MsgCode::CONTENT, body.clone()))
        });
    }
    tokio::spawn(server.clone().run());
    let client = client(&network);

    let req = Message::request(MsgType::Con, MsgCode::GET, "/big");
    let rsp = client
        .send("server", req, &SendOptions::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(MsgCode::CONTENT, rsp.msg_code);
    assert_eq!(body, rsp.payload);
    // Three GET exchanges at the default 1024-byte block size.
    assert_eq!(3, client.transport().sent_count());
}

#[tokio::test]
async fn block2_first_block_carries_size2() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    let body = pattern(3000);
    {
        let body = body.clone();
        server.add_route("/big", move |req| {
            Ok(req.make_reply(MsgCode::CONTENT, body.clone()))
        });
    }
    tokio::spawn(server.clone().run());

    let raw = network.join("raw", "rawpeer");
    let mut req = Message::request(MsgType::Con, MsgCode::GET, "/big");
    req.msg_id = 0x0101;
    req.token = MsgToken::new(b"bb").unwrap();
    raw.send("server", &codec::encode(&req).unwrap())
        .await
        .unwrap();

    let (data, _) = raw.recv().await.unwrap();
    let first = codec::decode(&data).unwrap();
    assert_eq!(MsgCode::CONTENT, first.msg_code);
    assert_eq!(1024, first.payload.len());
    assert_eq!(Some(3000), first.size2());
    let block = first.block2().unwrap();
    assert_eq!((0, true, 1024), (block.num, block.more, block.size));

    // Fetch the middle block explicitly.
    let mut req = Message::request(MsgType::Con, MsgCode::GET, "/big");
    req.msg_id = 0x0102;
    req.token = MsgToken::new(b"bb").unwrap();
    req.with_block2(BlockInfo::new(1, false, 1024).unwrap());
    raw.send("server", &codec::encode(&req).unwrap())
        .await
        .unwrap();

    let (data, _) = raw.recv().await.unwrap();
    let middle = codec::decode(&data).unwrap();
    assert_eq!(None, middle.size2());
    let block = middle.block2().unwrap();
    assert_eq!((1, true, 1024), (block.num, block.more, block.size));
    assert_eq!(&body[1024..2048], &middle.payload[..]);
}

#[tokio::test]
async fn block1_fragment_without_assembly_is_server_error() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    server.add_route("/u", |req| Ok(req.make_reply(MsgCode::CHANGED, Vec::new())));
    tokio::spawn(server.clone().run());

    let raw = network.join("raw", "rawpeer");
    // Fragment 1 of an upload whose fragment 0 never arrived.
    let mut req = Message::request(MsgType::Con, MsgCode::PUT, "/u");
    req.msg_id = 0x0201;
    req.token = MsgToken::new(b"t1").unwrap();
    req.payload = vec![0xAA; 64];
    req.with_block1(BlockInfo::new(1, true, 64).unwrap());
    raw.send("server", &codec::encode(&req).unwrap())
        .await
        .unwrap();

    let (data, _) = raw.recv().await.unwrap();
    let rsp = codec::decode(&data).unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, rsp.msg_code);
}

#[tokio::test]
async fn out_of_order_block1_fragment_is_server_error() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    let invocations = Arc::new(AtomicUsize::new(0));
    {
        let invocations = invocations.clone();
        server.add_route("/u", move |req| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok(req.make_reply(MsgCode::CHANGED, Vec::new()))
        });
    }
    tokio::spawn(server.clone().run());

    let raw = network.join("raw", "rawpeer");
    let token = MsgToken::new(b"oo").unwrap();
    let send_fragment = |msg_id: u16, num: u32, more: bool, fill: u8| {
        let mut req = Message::request(MsgType::Con, MsgCode::PUT, "/u");
        req.msg_id = msg_id;
        req.token = token;
        req.payload = vec![fill; 16];
        req.with_block1(BlockInfo::new(num, more, 16).unwrap());
        codec::encode(&req).unwrap()
    };
    let reply_code = |data: &[u8]| codec::decode(data).unwrap().msg_code;

    // Fragment 0 opens the assembly.
    raw.send("server", &send_fragment(0x0401, 0, true, 0xA0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::CONTINUE, reply_code(&data));

    // A gap (0 then 2) is a protocol error, not a silent concatenation.
    raw.send("server", &send_fragment(0x0402, 2, true, 0xC0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, reply_code(&data));

    // The assembly survives; the expected fragment is still accepted...
    raw.send("server", &send_fragment(0x0403, 1, true, 0xB0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::CONTINUE, reply_code(&data));

    // ...a repeat of it is refused...
    raw.send("server", &send_fragment(0x0404, 1, true, 0xB0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, reply_code(&data));

    // ...and so is a final fragment that skips ahead.
    raw.send("server", &send_fragment(0x0405, 3, false, 0xD0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, reply_code(&data));
    assert_eq!(0, invocations.load(Ordering::SeqCst));

    // Completing in sequence still hands the handler the exact payload.
    raw.send("server", &send_fragment(0x0406, 2, false, 0xC0))
        .await
        .unwrap();
    let (data, _) = raw.recv().await.unwrap();
    assert_eq!(MsgCode::CHANGED, reply_code(&data));
    assert_eq!(1, invocations.load(Ordering::SeqCst));
}

#[tokio::test]
async fn block2_read_without_cache_is_server_error() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    server.add_route("/big", |req| {
        Ok(req.make_reply(MsgCode::CONTENT, vec![0; 4096]))
    });
    tokio::spawn(server.clone().run());

    let raw = network.join("raw", "rawpeer");
    let mut req = Message::request(MsgType::Con, MsgCode::GET, "/big");
    req.msg_id = 0x0301;
    req.with_block2(BlockInfo::new(2, false, 1024).unwrap());
    raw.send("server", &codec::encode(&req).unwrap())
        .await
        .unwrap();

    let (data, _) = raw.recv().await.unwrap();
    let rsp = codec::decode(&data).unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, rsp.msg_code);
}

#[tokio::test]
async fn block1_uploads_from_different_peers_stay_separate() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    let received = Arc::new(std::sync::Mutex::new(Vec::<Vec<u8>>::new()));
    {
        let received = received.clone();
        server.add_route("/u", move |req| {
            received.lock().unwrap().push(req.payload.clone());
            Ok(req.make_reply(MsgCode::CHANGED, Vec::new()))
        });
    }
    tokio::spawn(server.clone().run());

    let client_a = {
        let client = Arc::new(Endpoint::new(network.join("a", "client-a")));
        tokio::spawn(client.clone().run());
        client
    };
    let client_b = {
        let client = Arc::new(Endpoint::new(network.join("b", "client-b")));
        tokio::spawn(client.clone().run());
        client
    };

    // Interleaved uploads to the same URI from two peers must not bleed into
    // each other's assemblies.
    let body_a = vec![0xAA; 200];
    let body_b = vec![0xBB; 150];
    let options = SendOptions::new().with_block_size(64);

    let upload_a = {
        let (client, body, options) = (client_a.clone(), body_a.clone(), options.clone());
        tokio::spawn(async move {
            let mut req = Message::request(MsgType::Con, MsgCode::PUT, "/u");
            req.payload = body;
            client.send("server", req, &options).await.unwrap().unwrap()
        })
    };
    let upload_b = {
        let (client, body, options) = (client_b.clone(), body_b.clone(), options.clone());
        tokio::spawn(async move {
            let mut req = Message::request(MsgType::Con, MsgCode::PUT, "/u");
            req.payload = body;
            client.send("server", req, &options).await.unwrap().unwrap()
        })
    };

    assert_eq!(MsgCode::CHANGED, upload_a.await.unwrap().msg_code);
    assert_eq!(MsgCode::CHANGED, upload_b.await.unwrap().msg_code);

    let received = received.lock().unwrap();
    assert_eq!(2, received.len());
    assert!(received.contains(&body_a));
    assert!(received.contains(&body_b));
}

#[tokio::test]
async fn fragmented_notification_is_collected_before_delivery() {
    let network = ChannelNetwork::new();
    let client = client(&network);
    let raw = network.join("raw", "rawsrv");

    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let callback: ObserveCallback = Arc::new(move |msg: &Message| {
        seen_tx.send(msg.payload.clone()).unwrap();
        Ok(())
    });

    // Answer the registration request.
    let register = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .observe(
                    "rawsrv",
                    MsgCode::GET,
                    "/data",
                    Vec::new(),
                    None,
                    callback,
                    &SendOptions::new(),
                )
                .await
                .unwrap()
        })
    };
    let (data, peer) = raw.recv().await.unwrap();
    let req = codec::decode(&data).unwrap();
    assert_eq!(Some(0), req.observe());
    peer.send(&codec::encode(&req.make_reply(MsgCode::CONTENT, b"d0".to_vec())).unwrap())
        .await
        .unwrap();
    let token = register.await.unwrap();
    assert_eq!(b"d0".to_vec(), seen_rx.recv().await.unwrap());

    // Publish a notification too large for one datagram: block zero now,
    // the rest on demand.
    let body = pattern(40);
    let mut notify = Message::new();
    notify.msg_type = MsgType::Con;
    notify.msg_code = MsgCode::CONTENT;
    notify.msg_id = 0x0500;
    notify.token = MsgToken::new(token.as_bytes()).unwrap();
    notify.with_observe(7).with_payload(body[..16].to_vec());
    notify.with_block2(BlockInfo::new(0, true, 16).unwrap());
    raw.send("client", &codec::encode(&notify).unwrap())
        .await
        .unwrap();

    // The client acknowledges right away, before fetching the remainder.
    let (data, _) = raw.recv().await.unwrap();
    let ack = codec::decode(&data).unwrap();
    assert_eq!(MsgType::Ack, ack.msg_type);
    assert!(ack.msg_code.is_empty());
    assert_eq!(0x0500, ack.msg_id);

    // Serve the two follow-up reads.
    for _ in 0..2 {
        let (data, peer) = raw.recv().await.unwrap();
        let req = codec::decode(&data).unwrap();
        assert_eq!(MsgCode::GET, req.msg_code);
        assert_eq!("data", req.path_string());
        let block = req.block2().unwrap();
        let start = block.num as usize * 16;
        let end = (start + 16).min(body.len());
        let mut rsp = req.make_reply(MsgCode::CONTENT, body[start..end].to_vec());
        rsp.with_block2(BlockInfo::new(block.num, end < body.len(), 16).unwrap());
        peer.send(&codec::encode(&rsp).unwrap()).await.unwrap();
    }

    // The assembled notification reaches the callback exactly once.
    assert_eq!(body, seen_rx.recv().await.unwrap());
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test]
async fn handler_error_becomes_5_00() {
    let network = ChannelNetwork::new();
    let server = Arc::new(Endpoint::new(network.join("srv", "server")));
    server.add_route("/fail", |_req| Err(Error::InvalidArgument));
    tokio::spawn(server.clone().run());
    let client = client(&network);

    let req = Message::request(MsgType::Con, MsgCode::GET, "/fail");
    let rsp = client
        .send("server", req, &SendOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(MsgCode::INTERNAL_SERVER_ERROR, rsp.msg_code);
}
