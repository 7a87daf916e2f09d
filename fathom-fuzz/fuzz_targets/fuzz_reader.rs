#![no_main]

use compio::buf::BufResult;
use compio::io::AsyncRead;
use fathom_core::buffer::Reader;
use libfuzzer_sys::fuzz_target;

/// An in-memory stream that feeds fuzz bytes back in small, uneven chunks,
/// the way a real socket would dole out partial reads across several
/// `poll`s rather than handing the whole buffer back in one shot.
struct ChunkedCursor {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl AsyncRead for ChunkedCursor {
    async fn read<B: compio::buf::IoBufMut>(&mut self, mut buf: B) -> BufResult<usize, B> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(self.chunk).min(buf.buf_capacity());
        unsafe {
            std::ptr::copy_nonoverlapping(remaining.as_ptr(), buf.as_buf_mut_ptr(), n);
            buf.set_buf_init(n);
        }
        self.pos += n;
        BufResult(Ok(n), buf)
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First byte seeds the reader's capacity (kept small so overflow paths
    // are reachable without enormous inputs); second seeds the chunk size
    // the stream doles bytes out in.
    let capacity = 1 + (data[0] as usize % 256);
    let chunk = 1 + (data[1] as usize % 32);
    let body = data[2..].to_vec();

    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let mut cursor = ChunkedCursor {
            data: body,
            pos: 0,
            chunk,
        };
        let mut reader = Reader::new(&mut cursor, capacity);

        // Repeatedly frame on newlines until the stream is exhausted or a
        // frame won't fit; neither outcome should ever panic.
        loop {
            match reader.read_line().await {
                Ok(line) => {
                    let len = line.len();
                    reader.shift(len);
                }
                Err(_) => break,
            }
        }
    });
});
