use packet_sniffer::decode;
use packet_sniffer::interface::find_device;
use packet_sniffer::source::RecordCodec;
use pcap::Capture;
use std::error;


/// Decodes the first PROBE_COUNT packets (default 100) on an interface and prints them.
fn main() -> Result<(), Box<dyn error::Error>> {
    let name = std::env::args().nth(1).unwrap_or_else(|| String::from("en0"));
    let count: usize = match std::env::var("PROBE_COUNT") {
        Ok(v) => v.parse()?,
        Err(_) => 100,
    };

    let device = find_device(&name)?;
    println!("Using device {}", device.name);

    let cap = Capture::from_device(device)?.immediate_mode(true).open()?;

    for record in cap.iter(RecordCodec).take(count) {
        let record = record?;
        let frame = decode(&record.data);
        println!(
            "{:?} {}/{} {}",
            record.capture_timestamp, record.captured_length(), record.original_length, frame
        );
    }

    Ok(())
}
