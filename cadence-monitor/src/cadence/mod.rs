// 帧节奏跟踪 - 采样与测量核心
//
// 本模块把对实时流的原始轮询转换为采样记录，并维护运行统计。
//
// # 核心组件
//
// - `CadenceTracker`: 节流门控、成功/失败分类、重复帧检测、最大间隔统计
// - `resolve_target_fps`: 由配置值或流报告值确定目标帧率

pub mod tracker;

pub use tracker::{frame_period, resolve_target_fps, CadenceTracker, PollOutcome, TrackerSummary};
