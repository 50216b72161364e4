pub mod wav;

pub use wav::{data_len, encode_channels, encode_wav, wav_header, write_wav, HEADER_LEN, MAX_DATA_LEN};
