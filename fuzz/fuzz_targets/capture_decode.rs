use honggfuzz::fuzz;
use netdict::CaptureReader;

fn main() {
    loop {
        fuzz!(|data: &[u8]| {
            // Decoding must end in records or MalformedCapture, never a panic.
            for record in CaptureReader::new(data) {
                if record.is_err() {
                    break;
                }
            }
        });
    }
}
