//! 定时运行
//!
//! 按固定间隔重复执行同步，首次运行可以锚定到某个星期几的某个时间。
//! 两次运行不会重叠：上一次结束后才开始计时。运行中收到停止信号时当前运行被中断。

use crate::error::SyncError;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// 首次运行锚点：星期几 + 当天时间（本地时间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub weekday: Weekday,
    pub time: NaiveTime,
}

impl Anchor {
    /// 解析 `"Mon 02:30"`、`"friday 18:00"` 形式的锚点
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        let invalid = || {
            SyncError::Config(format!(
                "invalid first run time {:?}, expected e.g. \"Mon 02:30\"",
                s
            ))
        };

        let re = Regex::new(r"^\s*([A-Za-z]+)\s+(\d{1,2}):(\d{2})\s*$")
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let caps = re.captures(s).ok_or_else(invalid)?;
        let weekday: Weekday = caps[1].parse().map_err(|_| invalid())?;
        let hour: u32 = caps[2].parse().map_err(|_| invalid())?;
        let minute: u32 = caps[3].parse().map_err(|_| invalid())?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)?;

        Ok(Self { weekday, time })
    }

    /// 严格晚于 `now` 的下一个锚点时刻
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - now.weekday().num_days_from_monday())
            % 7;
        let candidate = (now.date() + ChronoDuration::days(days_ahead as i64)).and_time(self.time);
        if candidate > now {
            candidate
        } else {
            candidate + ChronoDuration::days(7)
        }
    }
}

/// 从 `now` 到下一个锚点需要等待的时间
pub fn delay_until(now: NaiveDateTime, anchor: &Anchor) -> Duration {
    (anchor.next_after(now) - now)
        .to_std()
        .unwrap_or_default()
}

/// 调度参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// 上一次运行结束到下一次运行开始的间隔
    pub interval: Duration,
    pub first_run: Option<Anchor>,
}

/// 定时任务结束的时机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// 在两次运行之间（或首次运行之前）收到停止信号
    BetweenRuns,
    /// 运行过程中收到停止信号，当前运行被中断
    DuringRun,
}

/// 按计划重复运行 `job`，直到收到 Ctrl-C
///
/// Ctrl-C 监听在首次运行前就已安装，运行中和等待中的行为一致。
pub async fn run_scheduled<F, Fut>(schedule: &Schedule, job: F) -> Stopped
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("无法监听 Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("收到 Ctrl-C，停止定时任务");
    };
    run_until(schedule, job, ctrl_c).await
}

/// 按计划重复运行 `job`，直到 `shutdown` 完成
///
/// `shutdown` 在运行中完成时，当前运行在下一个 await 点被丢弃。
pub async fn run_until<F, Fut, S>(schedule: &Schedule, mut job: F, shutdown: S) -> Stopped
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if let Some(anchor) = &schedule.first_run {
        let delay = delay_until(Local::now().naive_local(), anchor);
        info!(
            "首次运行将在 {} 后开始 ({:?} {})",
            format_delay(delay),
            anchor.weekday,
            anchor.time.format("%H:%M")
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => return Stopped::BetweenRuns,
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = job() => {}
            _ = &mut shutdown => {
                warn!("运行被中断");
                return Stopped::DuringRun;
            }
        }

        info!("下一次运行将在 {} 后开始", format_delay(schedule.interval));
        tokio::select! {
            _ = tokio::time::sleep(schedule.interval) => {}
            _ = &mut shutdown => return Stopped::BetweenRuns,
        }
    }
}

fn format_delay(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
