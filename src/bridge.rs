//! Inference worker bridge.
//!
//! The synthesis engine, vocoder and transcriber run in a child process
//! (typically a Python script wrapping the reference implementation).  The
//! two sides exchange one JSON object per line over stdin/stdout:
//!
//! | request `action` | fields                                               | reply fields            |
//! |------------------|------------------------------------------------------|-------------------------|
//! | *(on start)*     |                                                      | `action: "ready"`       |
//! | `load`           | `backbone`, `checkpoint`, `vocab`, `config`          | `model_id`              |
//! | `synthesize`     | `model_id`, `ref_audio`, `ref_text`, `text`, `nfe_step`, `speed` | `audio` (base64 WAV), `mel` |
//! | `transcribe`     | `audio`                                              | `text`                  |
//! | `ping`           |                                                      | `model_loaded`          |
//! | `shutdown`       |                                                      | *(none)*                |
//!
//! Every reply carries `status` (`"ok"` or `"error"`) and, on error, `error`.
//! Worker logs go to stderr, which is inherited.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::audio;
use crate::config::LoadSpec;
use crate::engine::{ModelLoader, SpeechModel, Spectrogram, Synthesis, SynthesisRequest, Transcriber};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn inference worker: {0}")]
    Spawn(String),
    #[error("Inference worker not running")]
    NotRunning,
    #[error("Failed to communicate with inference worker: {0}")]
    Communication(String),
    #[error("Inference worker error: {0}")]
    Worker(String),
    #[error("Invalid response from inference worker: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct MelPayload {
    n_mels: usize,
    data: Vec<f32>,
}

/// One reply line from the worker.
#[derive(Debug, Deserialize)]
struct WorkerResponse {
    status: String,
    action: String,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    mel: Option<MelPayload>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    model_id: Option<u64>,
    #[serde(default)]
    model_loaded: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn send(&mut self, cmd: &serde_json::Value) -> Result<(), BridgeError> {
        let line = serde_json::to_string(cmd).map_err(|e| BridgeError::Communication(e.to_string()))?;
        writeln!(self.stdin, "{}", line).map_err(|e| BridgeError::Communication(e.to_string()))?;
        self.stdin.flush().map_err(|e| BridgeError::Communication(e.to_string()))
    }

    fn receive(&mut self) -> Result<WorkerResponse, BridgeError> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| BridgeError::Communication(e.to_string()))?;
        if n == 0 {
            return Err(BridgeError::NotRunning);
        }
        serde_json::from_str(&line)
            .map_err(|e| BridgeError::InvalidResponse(format!("JSON parse error: {}", e)))
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        let _ = self.send(&serde_json::json!({ "action": "shutdown" }));
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Shared handle to one worker process.  Clones talk to the same process;
/// requests are serialized.
#[derive(Clone)]
pub struct WorkerBridge {
    worker: Arc<Mutex<Option<WorkerProcess>>>,
}

impl WorkerBridge {
    /// Start `program args…` and wait for its ready line.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, BridgeError> {
        tracing::info!("Starting inference worker: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| BridgeError::Spawn(format!("{}: {}", program, e)))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::Spawn("worker pipes unavailable".to_string()));
        };
        let mut process = WorkerProcess { child, stdin, stdout: BufReader::new(stdout) };

        let ready = process.receive()?;
        if ready.status != "ok" || ready.action != "ready" {
            return Err(BridgeError::Spawn(
                ready.error.unwrap_or_else(|| "worker did not signal ready".to_string()),
            ));
        }
        Ok(Self { worker: Arc::new(Mutex::new(Some(process))) })
    }

    /// Start a Python worker script, preferring `python` when given.
    pub fn python(python: Option<&str>, script: &Path) -> Result<Self, BridgeError> {
        let python = match python {
            Some(p) => p,
            None if Command::new("python3").arg("--version").output().is_ok() => "python3",
            None => "python",
        };
        let script = script.to_string_lossy();
        Self::spawn(python, &[script.as_ref()])
    }

    fn request(&self, cmd: serde_json::Value) -> Result<WorkerResponse, BridgeError> {
        let mut guard = self
            .worker
            .lock()
            .map_err(|_| BridgeError::Communication("Failed to acquire lock".to_string()))?;
        let process = guard.as_mut().ok_or(BridgeError::NotRunning)?;
        process.send(&cmd)?;
        let response = process.receive()?;
        if response.status != "ok" {
            return Err(BridgeError::Worker(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        Ok(response)
    }

    /// True when the worker answers and reports a model loaded.
    pub fn is_ready(&self) -> bool {
        self.request(serde_json::json!({ "action": "ping" }))
            .map(|r| r.model_loaded.unwrap_or(false))
            .unwrap_or(false)
    }

    /// Stop the worker.  Later requests fail with [`BridgeError::NotRunning`].
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.worker.lock() {
            guard.take();
        }
    }
}

impl ModelLoader for WorkerBridge {
    fn load(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn SpeechModel>> {
        let response = self.request(serde_json::json!({
            "action": "load",
            "backbone": spec.backbone,
            "checkpoint": spec.checkpoint,
            "vocab": spec.vocab,
            "config": spec.config,
        }))?;
        let model_id = response
            .model_id
            .ok_or_else(|| BridgeError::InvalidResponse("No model_id in load response".to_string()))?;
        tracing::info!("Worker loaded {} as model {}", spec.checkpoint, model_id);
        Ok(Arc::new(WorkerModel { bridge: self.clone(), model_id }))
    }
}

impl Transcriber for WorkerBridge {
    fn transcribe(&self, audio: &Path) -> anyhow::Result<String> {
        let response = self.request(serde_json::json!({
            "action": "transcribe",
            "audio": audio,
        }))?;
        Ok(response
            .text
            .ok_or_else(|| BridgeError::InvalidResponse("No text in transcribe response".to_string()))?)
    }
}

/// A checkpoint loaded inside the worker.
pub struct WorkerModel {
    bridge: WorkerBridge,
    model_id: u64,
}

impl SpeechModel for WorkerModel {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> anyhow::Result<Synthesis> {
        let response = self.bridge.request(serde_json::json!({
            "action": "synthesize",
            "model_id": self.model_id,
            "ref_audio": request.reference.audio_path,
            "ref_text": request.reference.text,
            "text": request.text,
            "nfe_step": request.nfe_step,
            "speed": request.speed,
        }))?;
        Ok(decode_synthesis(response)?)
    }
}

fn decode_synthesis(response: WorkerResponse) -> Result<Synthesis, BridgeError> {
    let audio_b64 = response
        .audio
        .ok_or_else(|| BridgeError::InvalidResponse("No audio in response".to_string()))?;
    let wav = base64::engine::general_purpose::STANDARD
        .decode(audio_b64.trim())
        .map_err(|e| BridgeError::InvalidResponse(format!("Base64 decode error: {}", e)))?;
    let waveform = audio::decode_wav_bytes(&wav)
        .map_err(|e| BridgeError::InvalidResponse(format!("{:#}", e)))?;
    let spectrogram = response
        .mel
        .map(|m| Spectrogram { n_mels: m.n_mels, data: m.data })
        .unwrap_or_default();
    if spectrogram.n_mels > 0 && spectrogram.data.len() % spectrogram.n_mels != 0 {
        return Err(BridgeError::InvalidResponse(format!(
            "mel data length {} is not a multiple of {}",
            spectrogram.data.len(),
            spectrogram.n_mels
        )));
    }
    Ok(Synthesis { waveform, spectrogram })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waveform;

    fn response(json: serde_json::Value) -> WorkerResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_decode_synthesis() {
        let wave = Waveform::new(vec![0.0, 0.25, -0.25, 0.5], 24_000);
        let b64 = base64::engine::general_purpose::STANDARD.encode(audio::wav_bytes(&wave).unwrap());
        let out = decode_synthesis(response(serde_json::json!({
            "status": "ok",
            "action": "synthesize",
            "audio": b64,
            "mel": {"n_mels": 2, "data": [0.0, 1.0, 2.0, 3.0]},
        })))
        .unwrap();
        assert_eq!(out.waveform.sample_rate, 24_000);
        assert_eq!(out.waveform.samples.len(), 4);
        assert_eq!(out.spectrogram.frames(), 2);
    }

    #[test]
    fn test_decode_rejects_missing_audio_and_ragged_mel() {
        let err = decode_synthesis(response(serde_json::json!({"status": "ok", "action": "synthesize"})));
        assert!(matches!(err, Err(BridgeError::InvalidResponse(_))));

        let b64 = base64::engine::general_purpose::STANDARD
            .encode(audio::wav_bytes(&Waveform::new(vec![0.0], 24_000)).unwrap());
        let err = decode_synthesis(response(serde_json::json!({
            "status": "ok", "action": "synthesize", "audio": b64,
            "mel": {"n_mels": 3, "data": [0.0, 1.0]},
        })));
        assert!(matches!(err, Err(BridgeError::InvalidResponse(_))));
    }

    #[test]
    fn test_spawn_missing_program() {
        assert!(matches!(
            WorkerBridge::spawn("/nonexistent/f5-worker", &[]),
            Err(BridgeError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    const FAKE_WORKER: &str = r#"
echo '{"status":"ok","action":"ready"}'
while read -r line; do
  case "$line" in
    *'"action":"ping"'*) echo '{"status":"ok","action":"ping","model_loaded":true}' ;;
    *'"action":"load"'*) echo '{"status":"ok","action":"load","model_id":7}' ;;
    *'"action":"transcribe"'*) echo '{"status":"ok","action":"transcribe","text":"hello there"}' ;;
    *'"action":"shutdown"'*) exit 0 ;;
    *) echo '{"status":"error","action":"synthesize","error":"out of memory"}' ;;
  esac
done
"#;

    #[cfg(unix)]
    #[test]
    fn test_fake_worker_round_trip() {
        use crate::config::LoadSpec;
        use crate::engine::{Reference, Waveform};

        let bridge = WorkerBridge::spawn("sh", &["-c", FAKE_WORKER]).unwrap();
        assert!(bridge.is_ready());
        assert_eq!(bridge.transcribe(Path::new("/tmp/a.wav")).unwrap(), "hello there");

        let model = bridge.load(&LoadSpec::f5_tts()).unwrap();
        let wave = Waveform::default();
        let err = model
            .synthesize(&SynthesisRequest {
                reference: Reference { audio_path: Path::new("/tmp/a.wav"), audio: &wave, text: "Hi. " },
                text: "Hello",
                nfe_step: 32,
                speed: 1.0,
            })
            .unwrap_err();
        assert!(format!("{}", err).contains("out of memory"));

        bridge.shutdown();
        assert!(!bridge.is_ready());
        assert!(matches!(
            bridge.request(serde_json::json!({"action": "ping"})),
            Err(BridgeError::NotRunning)
        ));
    }
}
