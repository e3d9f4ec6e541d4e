use super::*;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

fn spawn_app(threaded: bool) -> (CancellationToken, std::thread::JoinHandle<()>, String) {
    let port = {
        // Bind to an ephemeral port to find one that's free, then release it.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let addr = format!("127.0.0.1:{port}");
    let mut cfg = Config::default();
    cfg.listen_addr = addr.clone();
    cfg.total_bytes = 4096;
    cfg.shards = 4;
    cfg.threaded = threaded;
    cfg.low_watermark = 1;
    cfg.high_watermark = 2;

    let token = CancellationToken::new();
    let app = App::new(cfg).unwrap();
    let handle = std::thread::spawn({
        let token = token.clone();
        move || {
            app.serve(token).unwrap();
        }
    });
    // Give the reactor a moment to bind and start accepting.
    std::thread::sleep(Duration::from_millis(100));
    (token, handle, addr)
}

fn roundtrip(addr: &str) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

    stream.write_all(b"PUT k 3\r\nabc\r\n").unwrap();
    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"OK\r\n");

    stream.write_all(b"GET k\r\n").unwrap();
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"abc\r\n");

    stream.write_all(b"DELETE k\r\n").unwrap();
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"OK\r\n");

    stream.write_all(b"GET k\r\n").unwrap();
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"NOT_FOUND\r\n");
}

#[test]
fn single_threaded_reactor_serves_a_full_put_get_delete_cycle_over_tcp() {
    let (token, handle, addr) = spawn_app(false);
    roundtrip(&addr);
    token.cancel();
    handle.join().unwrap();
}

#[test]
fn threaded_reactor_plus_executor_serves_a_full_put_get_delete_cycle_over_tcp() {
    let (token, handle, addr) = spawn_app(true);
    roundtrip(&addr);
    token.cancel();
    handle.join().unwrap();
}
