use crate::error::EnvError;
use std::fs;
use std::path::Path;

pub const DEFAULT_ALLOW_FALLOCATE: bool = true;
pub const DEFAULT_PUNCH_HOLE_ON_CLOSE: bool = true;

/// PosixEnv 的行为开关
///
/// 权限 (0644)、close-on-exec、mmap 最小尺寸、预分配块大小都是固定策略，不在这里配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOptions {
    // 关闭后 allocate / prepare_write 变为 no-op
    pub allow_fallocate: bool,
    // WritableFile 关闭时是否回收多预分配出来的磁盘块
    pub punch_hole_on_close: bool,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            allow_fallocate: DEFAULT_ALLOW_FALLOCATE,
            punch_hole_on_close: DEFAULT_PUNCH_HOLE_ON_CLOSE,
        }
    }
}

impl EnvOptions {
    /// 从 `key = value` 格式的文件加载，文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self, EnvError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| EnvError::from_io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, EnvError> {
        let mut options = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                match key {
                    "allow_fallocate" => options.allow_fallocate = parse_bool(key, value)?,
                    "punch_hole_on_close" => {
                        options.punch_hole_on_close = parse_bool(key, value)?
                    }
                    // 未知的 key 直接忽略，方便和上层配置文件共用
                    _ => {}
                }
            } else {
                return Err(EnvError::Config(format!("Malformed line: '{}'", line)));
            }
        }
        Ok(options)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, EnvError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        unknown => Err(EnvError::Config(format!(
            "Invalid {} '{}': expected a boolean",
            key, unknown
        ))),
    }
}
