use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use clap::{AppSettings, Arg, Command};
use tokio::net::UdpSocket;
use tokio::time::{Duration, Instant};
use webrtc_forwarder::job::JobCounter;
use webrtc_forwarder::rtp::header::Header;
use webrtc_forwarder::rtp::packet::Packet;
use webrtc_forwarder::rtp_map::{Format, RtpMap};
use webrtc_forwarder::{Engine, EngineConfig, Transport};
use util::marshal::Marshal;

const ENDPOINT: &str = "receiver";
const LOW_SSRC: u32 = 0x1000;
const HIGH_SSRC: u32 = 0x2000;
const OUTBOUND_SSRC: u32 = 0xA000;

struct UdpTransport {
    id: String,
    sock: UdpSocket,
    job_counter: JobCounter,
}

impl Transport for UdpTransport {
    fn is_connected(&self) -> bool {
        true
    }

    fn protect_and_send(&self, packet: BytesMut) {
        if let Err(err) = self.sock.try_send(&packet) {
            log::warn!("{} send failed: {}", self.id, err);
        }
    }

    fn loggable_id(&self) -> &str {
        &self.id
    }

    fn job_counter(&self) -> &JobCounter {
        &self.job_counter
    }
}

/// A simulcast layer producing VP8 packets with a key frame every
/// `key_frame_interval` packets.
struct Layer {
    ssrc: u32,
    sequence_number: u16,
    picture_id: u16,
    key_frame_interval: u16,
}

impl Layer {
    fn next(&mut self) -> Result<BytesMut> {
        let key_frame = self.picture_id % self.key_frame_interval == 0;
        let packet = Packet {
            header: Header {
                version: 2,
                payload_type: 100,
                sequence_number: self.sequence_number,
                timestamp: self.picture_id as u32 * 3000,
                ssrc: self.ssrc,
                ..Default::default()
            },
            payload: Bytes::from(vec![
                0x90,
                0x80,
                0x80 | (self.picture_id >> 8) as u8,
                self.picture_id as u8,
                if key_frame { 0x00 } else { 0x01 },
                0x9D,
                0x01,
                0x2A,
            ]),
        };
        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.picture_id = (self.picture_id + 1) & 0x7FFF;
        Ok(BytesMut::from(&packet.marshal()?[..]))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut app = Command::new("forward")
        .version("0.1.0")
        .author("Rain Liu <yliu@webrtc.rs>")
        .about("Forwards two simulated simulcast layers to a UDP port, switching layers halfway.")
        .setting(AppSettings::DeriveDisplayOrder)
        .arg(
            Arg::new("FULLHELP")
                .help("Prints more detailed help information")
                .long("fullhelp"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .short('d')
                .help("Prints debug log information"),
        )
        .arg(
            Arg::new("config")
                .takes_value(true)
                .long("config")
                .help("Engine configuration JSON file."),
        )
        .arg(
            Arg::new("port")
                .takes_value(true)
                .default_value("4000")
                .long("port")
                .help("UDP port on 127.0.0.1 receiving the forwarded stream."),
        )
        .arg(
            Arg::new("packets")
                .takes_value(true)
                .default_value("200")
                .long("packets")
                .help("Packets generated per layer."),
        );

    let matches = app.clone().get_matches();

    if matches.is_present("FULLHELP") {
        app.print_long_help()?;
        std::process::exit(0);
    }

    if matches.is_present("debug") {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log::LevelFilter::Trace)
            .init();
    }

    let config = match matches.value_of("config") {
        Some(path) => EngineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    let port = matches.value_of("port").unwrap_or("4000").parse::<u16>()?;
    let packets = matches.value_of("packets").unwrap_or("200").parse::<u16>()?;

    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(format!("127.0.0.1:{port}")).await?;
    let transport = Arc::new(UdpTransport {
        id: format!("udp-{port}"),
        sock,
        job_counter: JobCounter::new(),
    });

    let mut engine = Engine::new(config)?;
    let vp8 = RtpMap::new(Format::Vp8, 100)?;
    engine.add_endpoint(ENDPOINT, Arc::clone(&transport) as Arc<dyn Transport>);
    engine.add_inbound(LOW_SSRC, vp8);
    engine.add_inbound(HIGH_SSRC, vp8);
    engine.add_outbound(ENDPOINT, LOW_SSRC, OUTBOUND_SSRC, RtpMap::new(Format::Vp8, 96)?)?;

    let mut low = Layer {
        ssrc: LOW_SSRC,
        sequence_number: 65000,
        picture_id: 0,
        key_frame_interval: 30,
    };
    let mut high = Layer {
        ssrc: HIGH_SSRC,
        sequence_number: 100,
        picture_id: 7,
        key_frame_interval: 30,
    };

    let mut queued = 0;
    let mut plis = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    for i in 0..packets {
        ticker.tick().await;
        if i == packets / 2 {
            println!("switching {ENDPOINT} to the high layer");
            engine.set_outbound_source(ENDPOINT, OUTBOUND_SSRC, HIGH_SSRC)?;
        }
        queued += engine.on_video_packet(LOW_SSRC, low.next()?)?;
        queued += engine.on_video_packet(HIGH_SSRC, high.next()?)?;
        engine.process_messages();
        for pli in engine.collect_plis(Instant::now()) {
            println!("PLI to ssrc {}", pli.media_ssrc);
            plis += 1;
        }
    }

    while transport.job_counter().outstanding() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    println!("queued {queued} forwarding jobs, sent {plis} PLIs");

    Ok(())
}
