use crate::image::loader::MAX_IMAGE_BYTES;
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器监听地址
    pub host: String,

    /// 服务器端口
    pub port: u16,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// 启动时不预加载模型，首次请求时再加载
    pub lazy_loading: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 单个上传图像的最大大小（字节）
    pub max_image_size: usize,
}

impl Config {
    pub fn new(
        host: String,
        port: u16,
        models_dir: impl Into<PathBuf>,
        workers: Option<usize>,
        dev_mode: bool,
        lazy_loading: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        if workers == 0 {
            anyhow::bail!("worker count must be at least 1");
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            // 请求体上限比图像上限多留出表单开销
            max_request_size: MAX_IMAGE_BYTES + 1024 * 1024,
            max_image_size: MAX_IMAGE_BYTES,
        };

        Ok(Self {
            host,
            port,
            models_dir: models_dir.into(),
            workers,
            dev_mode,
            lazy_loading,
            onnx_config,
            server_config,
        })
    }

    /// 监听地址（host:port）
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = Config::new("127.0.0.1".into(), 5000, "models", Some(2), false, false).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.workers, 2);
        assert_eq!(config.server_config.request_timeout, 60);
    }

    #[test]
    fn request_limit_leaves_room_above_image_limit() {
        let config = Config::new("0.0.0.0".into(), 5000, "models", None, false, false).unwrap();
        let server = &config.server_config;
        assert_eq!(server.max_image_size, MAX_IMAGE_BYTES);
        assert!(server.max_request_size > server.max_image_size);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(Config::new("0.0.0.0".into(), 5000, "models", Some(0), false, false).is_err());
    }
}
