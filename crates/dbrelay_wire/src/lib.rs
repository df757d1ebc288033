pub mod framing;
pub mod socket;

pub use framing::{
    MAX_FRAME_SIZE, read_frame, recv_request, recv_response, send_request, send_response,
    write_frame,
};
pub use socket::{bind, unlink};
