use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::Measurement;
use vigil_sense::{Sensor, SensorError};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("sensor thread exited")]
    ChannelClosed,
    #[error("failed to spawn sensor thread: {0}")]
    Spawn(std::io::Error),
    #[error("poller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SampleResult = Result<Option<Measurement>, SensorError>;

/// Messages sent from the poller to the sensor thread.
struct SampleRequest {
    reply: oneshot::Sender<SampleResult>,
}

/// Clone-safe handle to the sensor thread.
#[derive(Clone)]
pub struct SensorHandle {
    tx: mpsc::Sender<SampleRequest>,
}

impl SensorHandle {
    /// Queue one sample request; the receiver resolves when the sensor answers.
    pub async fn request(&self) -> Result<oneshot::Receiver<SampleResult>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SampleRequest { reply })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx)
    }

    /// Request one sample and wait for it.
    pub async fn sample(&self) -> Result<Option<Measurement>, RuntimeError> {
        let rx = self.request().await?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }
}

/// Spawn the sensor on a dedicated OS thread.
///
/// Perception calls may block for a long time (model inference, device
/// reads); keeping them off the async runtime means a slow frame only delays
/// its own reply. The thread exits once every handle is dropped.
pub fn spawn_sensor<S>(mut sensor: S) -> Result<SensorHandle, RuntimeError>
where
    S: Sensor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<SampleRequest>(1);

    std::thread::Builder::new()
        .name("vigil-sensor".into())
        .spawn(move || {
            tracing::info!("sensor thread started");
            while let Some(req) = rx.blocking_recv() {
                let result = sensor.sample();
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "sensor sample failed");
                }
                let _ = req.reply.send(result);
            }
            tracing::info!("sensor thread exiting");
        })
        .map_err(RuntimeError::Spawn)?;

    Ok(SensorHandle { tx })
}
