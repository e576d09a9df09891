// src/queue.rs
//
// Orchestration queue between the upload path and the processing worker.
// Delivery is at-least-once: a job is acknowledged only after the worker
// returns, and the worker is safe to re-run on the same file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

use crate::worker::{ProcessOutcome, ProcessingWorker};

pub const QUEUE_NAME: &str = "files.process";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFileJob {
    pub file_id: i32,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("rabbitmq error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("job encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ProcessFileJob) -> Result<(), QueueError>;
}

/// What the runner does with a delivery once the worker has returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Not requeued here; retry policy belongs to whoever reads dead letters.
    DeadLetter(String),
}

pub async fn run_job(worker: &ProcessingWorker, job: ProcessFileJob) -> Settlement {
    match worker.process(job.file_id).await {
        Ok(ProcessOutcome::Completed { word_count }) => {
            log::info!("file processed file_id={} word_count={}", job.file_id, word_count);
            Settlement::Ack
        }
        Ok(ProcessOutcome::Dropped) => Settlement::Ack,
        Err(e) => {
            log::error!("file processing failed file_id={}: {e}", job.file_id);
            Settlement::DeadLetter(e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct RabbitQueue {
    channel: Channel,
}

impl RabbitQueue {
    pub async fn connect(rabbit_url: &str) -> Result<Self, QueueError> {
        let conn = Connection::connect(rabbit_url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                QUEUE_NAME,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(Self { channel })
    }

    /// Spawns `concurrency` consumers on the shared channel.
    pub fn start_consumers(&self, worker: Arc<ProcessingWorker>, concurrency: u16) {
        for n in 0..concurrency.max(1) {
            let channel = self.channel.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                if let Err(e) = consume_jobs(&channel, &worker, n).await {
                    log::error!("queue consume error consumer={n}: {e}");
                }
            });
        }
    }
}

#[async_trait]
impl JobQueue for RabbitQueue {
    async fn enqueue(&self, job: ProcessFileJob) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&job)?;
        self.channel
            .basic_publish(
                "",
                QUEUE_NAME,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }
}

async fn consume_jobs(
    channel: &Channel,
    worker: &ProcessingWorker,
    consumer_number: u16,
) -> Result<(), QueueError> {
    channel.basic_qos(1, BasicQosOptions::default()).await?;
    let mut consumer = channel
        .basic_consume(
            QUEUE_NAME,
            &format!("wordgate-worker-{consumer_number}"),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                log::error!("rabbitmq delivery error: {e}");
                continue;
            }
        };

        let job: ProcessFileJob = match serde_json::from_slice(&delivery.data) {
            Ok(job) => job,
            Err(e) => {
                log::error!("undecodable job message: {e}");
                if let Err(e) = delivery.nack(BasicNackOptions::default()).await {
                    log::error!("rabbitmq nack error: {e}");
                }
                continue;
            }
        };

        let settled = match run_job(worker, job).await {
            Settlement::Ack => delivery.ack(BasicAckOptions::default()).await,
            Settlement::DeadLetter(_) => delivery.nack(BasicNackOptions::default()).await,
        };
        if let Err(e) = settled {
            log::error!("rabbitmq settle error file_id={}: {e}", job.file_id);
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub job: ProcessFileJob,
    pub error: String,
}

/// In-process queue with the same pull/ack contract as the broker.
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<ProcessFileJob>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    notify: Notify,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<ProcessFileJob> {
        locked(&self.pending).iter().copied().collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        locked(&self.dead_letters).clone()
    }

    /// Puts an already-processed job back, as a broker does on redelivery.
    pub fn redeliver(&self, job: ProcessFileJob) {
        locked(&self.pending).push_back(job);
        self.notify.notify_one();
    }

    /// Pulls and settles one job. `None` when the queue is empty.
    pub async fn run_once(&self, worker: &ProcessingWorker) -> Option<Settlement> {
        let job = locked(&self.pending).pop_front()?;
        let settlement = run_job(worker, job).await;
        if let Settlement::DeadLetter(error) = &settlement {
            locked(&self.dead_letters).push(DeadLetter {
                job,
                error: error.clone(),
            });
        }
        Some(settlement)
    }

    /// Runs until the queue is empty and returns the number of jobs settled.
    pub async fn drain(&self, worker: &ProcessingWorker) -> usize {
        let mut settled = 0;
        while self.run_once(worker).await.is_some() {
            settled += 1;
        }
        settled
    }

    pub fn start_consumer(self: Arc<Self>, worker: Arc<ProcessingWorker>) {
        tokio::spawn(async move {
            loop {
                let notified = self.notify.notified();
                self.drain(&worker).await;
                notified.await;
            }
        });
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: ProcessFileJob) -> Result<(), QueueError> {
        locked(&self.pending).push_back(job);
        self.notify.notify_one();
        Ok(())
    }
}
