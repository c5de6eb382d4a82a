//! End-to-end driver tests against an in-memory fake server.
//!
//! Each test wires a [`Connection`] to one half of a `tokio::io::duplex`
//! pair and scripts the server half by hand: consume the version magic,
//! deframe queries, answer with hand-built response frames.

use std::collections::BTreeMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use photondb_driver::network::protocol::{encode_query, frame, VERSION_V0_1};
use photondb_driver::wire::schema::{self, FrameType, QueryType, ResponseType};
use photondb_driver::wire::{self, Value, WireMessage};
use photondb_driver::{r, ConnectOptions, Connection, Datum, Error, Frame};

async fn connect_pair() -> (Connection, DuplexStream) {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::with_stream(client, ConnectOptions::new())
        .await
        .unwrap();
    let mut magic = [0u8; 4];
    server.read_exact(&mut magic).await.unwrap();
    assert_eq!(u32::from_le_bytes(magic), VERSION_V0_1);
    (conn, server)
}

async fn read_query(server: &mut DuplexStream) -> WireMessage {
    let mut len = [0u8; 4];
    server.read_exact(&mut len).await.unwrap();
    let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
    server.read_exact(&mut payload).await.unwrap();
    wire::deserialize(&schema::QUERY, &payload).unwrap()
}

fn query_token(msg: &WireMessage) -> u64 {
    msg.get_str(3).unwrap().unwrap().parse().unwrap()
}

fn query_type(msg: &WireMessage) -> i32 {
    msg.get_enum(1).unwrap().unwrap()
}

fn response(rtype: ResponseType, token: u64, results: Vec<Datum>) -> Vec<u8> {
    let mut msg = WireMessage::new(&schema::RESPONSE);
    msg.set(1, Value::Enum(rtype as i32));
    msg.set(2, Value::Str(token.to_string()));
    for datum in results {
        msg.push(3, Value::Message(datum.to_wire()));
    }
    frame(&wire::serialize(&msg).unwrap())
}

fn error_response(
    rtype: ResponseType,
    token: u64,
    message: &str,
    backtrace: Vec<Frame>,
) -> Vec<u8> {
    let mut msg = WireMessage::new(&schema::RESPONSE);
    msg.set(1, Value::Enum(rtype as i32));
    msg.set(2, Value::Str(token.to_string()));
    msg.push(3, Value::Message(Datum::String(message.to_string()).to_wire()));
    if !backtrace.is_empty() {
        let mut bt = WireMessage::new(&schema::BACKTRACE);
        for entry in backtrace {
            let mut f = WireMessage::new(&schema::FRAME);
            match entry {
                Frame::Pos(pos) => {
                    f.set(1, Value::Enum(FrameType::Pos as i32));
                    f.set(2, Value::Int64(pos));
                }
                Frame::Opt(key) => {
                    f.set(1, Value::Enum(FrameType::Opt as i32));
                    f.set(3, Value::Str(key));
                }
            }
            bt.push(1, Value::Message(f));
        }
        msg.set(4, Value::Message(bt));
    }
    frame(&wire::serialize(&msg).unwrap())
}

fn nums(values: &[i64]) -> Vec<Datum> {
    values.iter().map(|v| Datum::Number(*v as f64)).collect()
}

#[tokio::test]
async fn test_atom_query_end_to_end() {
    let (conn, mut server) = connect_pair().await;

    let query = r::table("posts").get("k");
    let server_side = async {
        let msg = read_query(&mut server).await;
        assert_eq!(query_type(&msg), QueryType::Start as i32);
        let token = query_token(&msg);

        let mut row = BTreeMap::new();
        row.insert("id".to_string(), Datum::String("k".to_string()));
        row.insert("v".to_string(), Datum::Number(1.0));
        server
            .write_all(&response(
                ResponseType::SuccessAtom,
                token,
                vec![Datum::Object(row)],
            ))
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    let datum = result.unwrap().into_datum().unwrap();
    match datum {
        Datum::Object(fields) => {
            assert_eq!(fields.get("id"), Some(&Datum::String("k".to_string())));
            assert_eq!(fields.get("v"), Some(&Datum::Number(1.0)));
        }
        other => panic!("expected object, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multiplexed_queries_answered_out_of_order() {
    let (conn, mut server) = connect_pair().await;

    let q1 = r::expr(1);
    let q2 = r::expr(2);
    let first = conn.run(&q1);
    let second = conn.run(&q2);

    let server_side = async {
        let q1 = read_query(&mut server).await;
        let q2 = read_query(&mut server).await;
        let (t1, t2) = (query_token(&q1), query_token(&q2));
        assert_ne!(t1, t2);

        // Answer in reverse submission order.
        server
            .write_all(&response(ResponseType::SuccessAtom, t2, nums(&[2])))
            .await
            .unwrap();
        server
            .write_all(&response(ResponseType::SuccessAtom, t1, nums(&[1])))
            .await
            .unwrap();
    };

    let (r1, r2, ()) = tokio::join!(first, second, server_side);
    assert_eq!(r1.unwrap().into_datum().unwrap(), Datum::Number(1.0));
    assert_eq!(r2.unwrap().into_datum().unwrap(), Datum::Number(2.0));
}

#[tokio::test]
async fn test_cursor_pulls_chunks_until_terminal_sequence() {
    let (conn, mut server) = connect_pair().await;
    let query = r::table("t");

    let server_side = tokio::spawn(async move {
        let start = read_query(&mut server).await;
        assert_eq!(query_type(&start), QueryType::Start as i32);
        let token = query_token(&start);
        server
            .write_all(&response(ResponseType::SuccessPartial, token, nums(&[1, 2])))
            .await
            .unwrap();

        let cont = read_query(&mut server).await;
        assert_eq!(query_type(&cont), QueryType::Continue as i32);
        assert_eq!(query_token(&cont), token);
        server
            .write_all(&response(ResponseType::SuccessPartial, token, nums(&[3])))
            .await
            .unwrap();

        let cont = read_query(&mut server).await;
        assert_eq!(query_type(&cont), QueryType::Continue as i32);
        server
            .write_all(&response(
                ResponseType::SuccessSequence,
                token,
                nums(&[4, 5]),
            ))
            .await
            .unwrap();
        server
    });

    let cursor = conn.run(&query).await.unwrap().into_cursor().unwrap();
    let mut seen = Vec::new();
    cursor
        .each(|row| seen.push(row.as_number().unwrap() as i64))
        .await
        .unwrap();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert!(matches!(cursor.next().await, Err(Error::NoMoreRows)));
    server_side.await.unwrap();
}

#[tokio::test]
async fn test_terminal_sequence_needs_no_continue() {
    let (conn, mut server) = connect_pair().await;

    let server_side = async {
        let start = read_query(&mut server).await;
        let token = query_token(&start);
        server
            .write_all(&response(
                ResponseType::SuccessSequence,
                token,
                nums(&[7, 8]),
            ))
            .await
            .unwrap();
    };

    let query = r::table("t");
    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    let cursor = result.unwrap().into_cursor().unwrap();
    assert_eq!(cursor.to_vec().await.unwrap(), nums(&[7, 8]));
}

#[tokio::test]
async fn test_runtime_error_carries_caret_annotated_query() {
    let (conn, mut server) = connect_pair().await;
    let query = r::expr(1).add("x");

    let server_side = async {
        let msg = read_query(&mut server).await;
        let token = query_token(&msg);
        server
            .write_all(&error_response(
                ResponseType::RuntimeError,
                token,
                "Expected type NUMBER but found STRING.",
                vec![Frame::Pos(1)],
            ))
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    let err = result.unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("Expected type NUMBER but found STRING."));
    assert!(rendered.contains("r.expr(1).add(\"x\")"));
    assert!(rendered.contains("              ^^^"));
}

#[tokio::test]
async fn test_compile_error_maps_to_compile_variant() {
    let (conn, mut server) = connect_pair().await;

    let server_side = async {
        let msg = read_query(&mut server).await;
        let token = query_token(&msg);
        server
            .write_all(&error_response(
                ResponseType::CompileError,
                token,
                "bad query",
                vec![],
            ))
            .await
            .unwrap();
    };

    let query = r::expr(1);
    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    assert!(matches!(result, Err(Error::Compile(_))));
}

#[tokio::test]
async fn test_cursor_close_sends_stop() {
    let (conn, mut server) = connect_pair().await;

    let server_side = tokio::spawn(async move {
        let start = read_query(&mut server).await;
        let token = query_token(&start);
        server
            .write_all(&response(ResponseType::SuccessPartial, token, nums(&[1])))
            .await
            .unwrap();

        let stop = read_query(&mut server).await;
        assert_eq!(query_type(&stop), QueryType::Stop as i32);
        assert_eq!(query_token(&stop), token);
        server
            .write_all(&response(ResponseType::SuccessSequence, token, vec![]))
            .await
            .unwrap();
        server
    });

    let cursor = conn.run(&r::table("t")).await.unwrap().into_cursor().unwrap();
    assert_eq!(cursor.next().await.unwrap(), Datum::Number(1.0));
    cursor.close().await.unwrap();
    server_side.await.unwrap();
}

#[tokio::test]
async fn test_transport_close_fails_pending_query() {
    let (conn, mut server) = connect_pair().await;

    let server_side = async {
        let _ = read_query(&mut server).await;
        drop(server);
    };

    let query = r::expr(1);
    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    assert!(matches!(result, Err(Error::Driver(_))));
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_unknown_token_response_is_ignored() {
    let (conn, mut server) = connect_pair().await;

    let server_side = async {
        let msg = read_query(&mut server).await;
        let token = query_token(&msg);
        // A stale response for a long-retired token arrives first.
        server
            .write_all(&response(ResponseType::SuccessAtom, token + 50, nums(&[0])))
            .await
            .unwrap();
        server
            .write_all(&response(ResponseType::SuccessAtom, token, nums(&[1])))
            .await
            .unwrap();
    };

    let query = r::expr(1);
    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    assert_eq!(result.unwrap().into_datum().unwrap(), Datum::Number(1.0));
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_response_bytes_dribbled_across_reads() {
    let term = r::expr(1);
    // A fresh connection always allocates token 1, so the outbound bytes are
    // fully deterministic and can be scripted.
    let query_frame = frame(&encode_query(QueryType::Start, 1, Some(&term), &[]).unwrap());
    let resp = response(ResponseType::SuccessAtom, 1, nums(&[9]));
    let (head, tail) = resp.split_at(3);

    let mock = tokio_test::io::Builder::new()
        .write(&VERSION_V0_1.to_le_bytes())
        .write(&query_frame)
        .read(head)
        .read(tail)
        .build();

    let conn = Connection::with_stream(mock, ConnectOptions::new())
        .await
        .unwrap();
    let datum = conn.run(&term).await.unwrap().into_datum().unwrap();
    assert_eq!(datum, Datum::Number(9.0));
}

#[tokio::test]
async fn test_default_db_travels_as_global_optarg() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::with_stream(client, ConnectOptions::new().db("blog"))
        .await
        .unwrap();
    let mut magic = [0u8; 4];
    server.read_exact(&mut magic).await.unwrap();

    let server_side = async {
        let msg = read_query(&mut server).await;
        let pairs = msg.get_all(6);
        assert_eq!(pairs.len(), 1);
        match &pairs[0] {
            Value::Message(pair) => {
                assert_eq!(pair.get_str(1).unwrap(), Some("db"));
            }
            other => panic!("expected message, got {:?}", other),
        }
        let token = query_token(&msg);
        server
            .write_all(&response(ResponseType::SuccessAtom, token, nums(&[0])))
            .await
            .unwrap();
    };

    let query = r::table("posts");
    let (result, ()) = tokio::join!(conn.run(&query), server_side);
    result.unwrap();
}
