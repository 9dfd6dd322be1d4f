use std::io::{Read, Write};

use log::info;
use minitcp::host::Interface;

fn main() {
    env_logger::init();

    let mut iface = Interface::new("tun0").expect("failed to bring up TUN device");
    let mut listener = iface.bind(9000).expect("failed to bind port 9000");

    info!("listening on tun0:9000");

    loop {
        let mut stream = match listener.accept() {
            Ok(s) => s,
            Err(e) => {
                log::error!("accept failed: {}", e);
                continue;
            }
        };

        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("read failed: {}", e);
                    break;
                }
            }
        }
    }
}
