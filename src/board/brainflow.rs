use crate::board::{BoardSession, SampleWindow};
use crate::config::BoardConfig;
use crate::error::{OscillationError, Result};
use anyhow::{anyhow, Context};
use libloading::Library;
use ndarray::Array2;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int};
use std::path::{Path, PathBuf};

const PRESET_DEFAULT: c_int = 0;
const STREAM_RINGBUF_PACKETS: c_int = 450_000;

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY: &str = "BoardController.dll";
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libBoardController.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARY: &str = "libBoardController.so";

/// Mirrors BrainFlow's `BrainFlowInputParams` JSON.
#[derive(Debug, Serialize)]
struct BrainFlowInputParams {
    serial_port: String,
    mac_address: String,
    ip_address: String,
    ip_address_aux: String,
    ip_address_anc: String,
    ip_port: i32,
    ip_port_aux: i32,
    ip_port_anc: i32,
    ip_protocol: i32,
    other_info: String,
    timeout: i32,
    serial_number: String,
    file: String,
    file_aux: String,
    file_anc: String,
    master_board: i32,
}

impl BrainFlowInputParams {
    fn from_config(config: &BoardConfig) -> Self {
        Self {
            serial_port: config.serial_port.clone(),
            mac_address: config.mac_address.clone(),
            ip_address: config.ip_address.clone(),
            ip_address_aux: String::new(),
            ip_address_anc: String::new(),
            ip_port: config.ip_port,
            ip_port_aux: 0,
            ip_port_anc: 0,
            ip_protocol: config.ip_protocol,
            other_info: String::new(),
            timeout: config.timeout,
            serial_number: config.serial_number.clone(),
            file: config.file.clone(),
            file_aux: String::new(),
            file_anc: String::new(),
            master_board: config.master_board,
        }
    }
}

struct BrainFlowApi {
    #[allow(dead_code)]
    lib: Library,
    prepare_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    start_stream: unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int,
    stop_stream: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    release_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    get_sampling_rate: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_num_rows: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_eeg_channels: unsafe extern "C" fn(c_int, c_int, *mut c_int, *mut c_int) -> c_int,
    get_current_board_data: unsafe extern "C" fn(
        c_int,
        c_int,
        *mut c_double,
        *mut c_int,
        c_int,
        *const c_char,
    ) -> c_int,
}

impl BrainFlowApi {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let lib = unsafe { Library::new(path) }
            .with_context(|| format!("{} could not be loaded", path.display()))?;
        // Safety: signatures follow the BrainFlow C API headers.
        unsafe {
            Ok(Self {
                prepare_session: *lib.get(b"prepare_session\0")?,
                start_stream: *lib.get(b"start_stream\0")?,
                stop_stream: *lib.get(b"stop_stream\0")?,
                release_session: *lib.get(b"release_session\0")?,
                get_sampling_rate: *lib.get(b"get_sampling_rate\0")?,
                get_num_rows: *lib.get(b"get_num_rows\0")?,
                get_eeg_channels: *lib.get(b"get_eeg_channels\0")?,
                get_current_board_data: *lib.get(b"get_current_board_data\0")?,
                lib,
            })
        }
    }

    /// The library is loaded once per process; later paths are ignored.
    fn instance(path: &Path) -> anyhow::Result<&'static BrainFlowApi> {
        static API: OnceCell<BrainFlowApi> = OnceCell::new();
        API.get_or_try_init(|| Self::load(path))
    }

    fn check(code: c_int, ctx: &str) -> anyhow::Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(anyhow!("{ctx} failed (BrainFlow code {code})"))
        }
    }

    fn sampling_rate(&self, board_id: c_int) -> anyhow::Result<c_int> {
        let mut rate: c_int = 0;
        Self::check(
            unsafe { (self.get_sampling_rate)(board_id, PRESET_DEFAULT, &mut rate as *mut c_int) },
            "get_sampling_rate",
        )?;
        Ok(rate)
    }

    fn num_rows(&self, board_id: c_int) -> anyhow::Result<c_int> {
        let mut rows: c_int = 0;
        Self::check(
            unsafe { (self.get_num_rows)(board_id, PRESET_DEFAULT, &mut rows as *mut c_int) },
            "get_num_rows",
        )?;
        Ok(rows)
    }

    fn eeg_channels(&self, board_id: c_int, max_channels: usize) -> anyhow::Result<Vec<usize>> {
        let mut out_len: c_int = 0;
        let mut buf = vec![0 as c_int; max_channels.max(32)];
        Self::check(
            unsafe {
                (self.get_eeg_channels)(
                    board_id,
                    PRESET_DEFAULT,
                    buf.as_mut_ptr(),
                    &mut out_len as *mut c_int,
                )
            },
            "get_eeg_channels",
        )?;
        buf.truncate(out_len.max(0) as usize);
        Ok(buf.into_iter().map(|row| row.max(0) as usize).collect())
    }

    /// Fills `buffer` row-major (`rows x returned`) and returns `returned`.
    fn current_board_data(
        &self,
        board_id: c_int,
        input: &CString,
        num_rows: usize,
        num_samples: usize,
        buffer: &mut [f64],
    ) -> anyhow::Result<usize> {
        let expected = num_rows * num_samples;
        if buffer.len() < expected {
            return Err(anyhow!("buffer too small: {} < {}", buffer.len(), expected));
        }
        let mut current_size: c_int = 0;
        Self::check(
            unsafe {
                (self.get_current_board_data)(
                    num_samples as c_int,
                    PRESET_DEFAULT,
                    buffer.as_mut_ptr(),
                    &mut current_size as *mut c_int,
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_current_board_data",
        )?;
        Ok((current_size.max(0) as usize).min(num_samples))
    }
}

fn device_err(operation: &'static str) -> impl FnOnce(anyhow::Error) -> OscillationError {
    move |err| OscillationError::device(operation, format!("{err:#}"))
}

/// Which native calls the current session still owes. BrainFlow reports an
/// error when releasing a board that was never prepared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Lifecycle {
    prepared: bool,
    streaming: bool,
}

impl Lifecycle {
    fn release(&mut self, release_session: impl FnOnce() -> Result<()>) -> Result<()> {
        if !self.prepared {
            log::debug!("session was never prepared; skipping release_session");
            return Ok(());
        }
        *self = Self::default();
        release_session()
    }
}

/// BrainFlow-backed board session (Cyton, Cyton+Daisy, Ganglion, ...).
pub struct BrainFlowBoard {
    api: &'static BrainFlowApi,
    board_id: c_int,
    input_json: CString,
    streamer_params: Option<CString>,
    eeg_channels: Vec<usize>,
    num_rows: usize,
    sampling_rate: f64,
    lifecycle: Lifecycle,
}

impl BrainFlowBoard {
    pub fn default_library_path() -> PathBuf {
        PathBuf::from(DEFAULT_LIBRARY)
    }

    /// Loads the library and reads the board description. The session itself
    /// is created by [`BoardSession::prepare`].
    pub fn open(config: &BoardConfig) -> Result<Self> {
        let path = config
            .library_path
            .clone()
            .unwrap_or_else(Self::default_library_path);
        let api = BrainFlowApi::instance(&path).map_err(device_err("load BoardController"))?;
        let json = serde_json::to_string(&BrainFlowInputParams::from_config(config))
            .map_err(|e| OscillationError::Config(format!("BrainFlow input params: {e}")))?;
        let input_json = CString::new(json)
            .map_err(|e| OscillationError::Config(format!("BrainFlow input params: {e}")))?;
        let streamer_params = if config.streamer_params.is_empty() {
            None
        } else {
            Some(CString::new(config.streamer_params.as_str()).map_err(|e| {
                OscillationError::Config(format!("streamer params: {e}"))
            })?)
        };
        let board_id = config.board_id;
        let sampling_rate = api
            .sampling_rate(board_id)
            .map_err(device_err("get_sampling_rate"))? as f64;
        let num_rows = api.num_rows(board_id).map_err(device_err("get_num_rows"))? as usize;
        let eeg_channels = api
            .eeg_channels(board_id, num_rows)
            .map_err(device_err("get_eeg_channels"))?;
        log::info!(
            "BrainFlow board {board_id}: {sampling_rate} Hz, {num_rows} rows, \
             EEG rows {eeg_channels:?}"
        );
        Ok(Self {
            api,
            board_id,
            input_json,
            streamer_params,
            eeg_channels,
            num_rows,
            sampling_rate,
            lifecycle: Lifecycle::default(),
        })
    }
}

impl BoardSession for BrainFlowBoard {
    fn prepare(&mut self) -> Result<()> {
        BrainFlowApi::check(
            unsafe { (self.api.prepare_session)(self.board_id, self.input_json.as_ptr()) },
            "prepare_session",
        )
        .map_err(device_err("prepare_session"))?;
        self.lifecycle.prepared = true;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        if self.lifecycle.streaming {
            return Ok(());
        }
        let streamer = self
            .streamer_params
            .as_ref()
            .map_or(std::ptr::null(), |s| s.as_ptr());
        BrainFlowApi::check(
            unsafe {
                (self.api.start_stream)(
                    STREAM_RINGBUF_PACKETS,
                    streamer,
                    self.board_id,
                    self.input_json.as_ptr(),
                )
            },
            "start_stream",
        )
        .map_err(device_err("start_stream"))?;
        self.lifecycle.streaming = true;
        Ok(())
    }

    fn get_latest_samples(&mut self, n: usize) -> Result<SampleWindow> {
        if !self.lifecycle.streaming {
            return Err(OscillationError::device(
                "get_current_board_data",
                "stream is not running",
            ));
        }
        let mut buf = vec![0.0f64; self.num_rows * n];
        let returned = self
            .api
            .current_board_data(self.board_id, &self.input_json, self.num_rows, n, &mut buf)
            .map_err(device_err("get_current_board_data"))?;
        buf.truncate(self.num_rows * returned);
        let data = Array2::from_shape_vec((self.num_rows, returned), buf)
            .map_err(|e| OscillationError::device("get_current_board_data", e))?;
        SampleWindow::new(data, self.eeg_channels.clone(), self.sampling_rate)
    }

    fn stop_stream(&mut self) -> Result<()> {
        if !self.lifecycle.streaming {
            return Ok(());
        }
        self.lifecycle.streaming = false;
        BrainFlowApi::check(
            unsafe { (self.api.stop_stream)(self.board_id, self.input_json.as_ptr()) },
            "stop_stream",
        )
        .map_err(device_err("stop_stream"))
    }

    fn release(&mut self) -> Result<()> {
        let (api, board_id, input_json) = (self.api, self.board_id, &self.input_json);
        self.lifecycle.release(|| {
            BrainFlowApi::check(
                unsafe { (api.release_session)(board_id, input_json.as_ptr()) },
                "release_session",
            )
            .map_err(device_err("release_session"))
        })
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn eeg_channel_count(&self) -> usize {
        self.eeg_channels.len()
    }

    fn description(&self) -> String {
        format!("BrainFlow board {}", self.board_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardBackend, CYTON_BOARD, NO_BOARD};

    #[test]
    fn input_params_carry_transport_settings() {
        let config = BoardConfig {
            backend: BoardBackend::BrainFlow,
            board_id: CYTON_BOARD,
            serial_port: "/dev/cu.usbserial-DM03GRD1".into(),
            timeout: 15,
            ip_port: 6677,
            ..BoardConfig::default()
        };
        let json = serde_json::to_value(BrainFlowInputParams::from_config(&config)).unwrap();
        assert_eq!(json["serial_port"], "/dev/cu.usbserial-DM03GRD1");
        assert_eq!(json["timeout"], 15);
        assert_eq!(json["ip_port"], 6677);
        assert_eq!(json["master_board"], NO_BOARD);
        assert_eq!(json["other_info"], "");
    }

    #[test]
    fn missing_library_is_a_device_error() {
        let config = BoardConfig {
            library_path: Some(PathBuf::from("/nonexistent/libBoardController.so")),
            ..BoardConfig::default()
        };
        match BrainFlowBoard::open(&config) {
            Err(OscillationError::Device { operation, .. }) => {
                assert_eq!(operation, "load BoardController")
            }
            Err(other) => panic!("unexpected {other:?}"),
            Ok(_) => panic!("library should not load"),
        }
    }

    #[test]
    fn release_only_follows_a_prepared_session() {
        let mut calls = 0;
        let mut lifecycle = Lifecycle::default();
        lifecycle
            .release(|| {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 0);

        lifecycle = Lifecycle {
            prepared: true,
            streaming: true,
        };
        let failed = lifecycle.release(|| {
            calls += 1;
            Err(OscillationError::device("release_session", "board gone"))
        });
        assert!(failed.is_err());
        assert_eq!(calls, 1);
        assert_eq!(lifecycle, Lifecycle::default());

        // Released once already: nothing left to release.
        lifecycle.release(|| panic!("released twice")).unwrap();
    }
}
