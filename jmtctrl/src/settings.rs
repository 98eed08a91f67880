use clap::Args;
use std::{
    path::PathBuf,
    time::Duration,
};

/// Runtime settings shared by the control platform and the bins; every
/// flag also reads from the environment so a dotenv file can carry the
/// deployment configuration.
#[derive(Args, Clone, Debug)]
pub struct Settings {
    #[clap(long, value_name = "JMT_PLAN_ROOT", env = "JMT_PLAN_ROOT",
        default_value = "jmx_files")]
    pub plan_root: PathBuf,
    #[clap(long, value_name = "JMT_LOG_ROOT", env = "JMT_LOG_ROOT",
        default_value = "jtl_files")]
    pub log_root: PathBuf,
    #[clap(long, value_name = "JMT_REPORT_ROOT", env = "JMT_REPORT_ROOT",
        default_value = "reports")]
    pub report_root: PathBuf,
    #[clap(long, value_name = "JMT_JMETER_HOME", env = "JMT_JMETER_HOME",
        default_value = "/opt/apache-jmeter-5.5")]
    pub jmeter_home: PathBuf,
    /// Per-task execution bound in seconds; 0 disables it.
    #[clap(long, value_name = "JMT_EXEC_TIMEOUT", env = "JMT_EXEC_TIMEOUT",
        default_value = "3600")]
    pub exec_timeout: u64,
    #[clap(long, value_name = "JMT_REPORT_TIMEOUT", env = "JMT_REPORT_TIMEOUT",
        default_value = "300")]
    pub report_timeout: u64,
    /// Render the HTML report as soon as a queued run completes.
    #[clap(long, env = "JMT_AUTO_REPORT")]
    pub auto_report: bool,
}

impl Settings {
    pub fn jmeter_bin(&self) -> PathBuf {
        self.jmeter_home.join("bin").join("jmeter")
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        (self.exec_timeout > 0).then(|| Duration::from_secs(self.exec_timeout))
    }

    pub fn report_timeout(&self) -> Option<Duration> {
        (self.report_timeout > 0).then(|| Duration::from_secs(self.report_timeout))
    }

    /// The storage roots are expected on startup.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.plan_root)?;
        std::fs::create_dir_all(&self.log_root)?;
        std::fs::create_dir_all(&self.report_root)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plan_root: "jmx_files".into(),
            log_root: "jtl_files".into(),
            report_root: "reports".into(),
            jmeter_home: "/opt/apache-jmeter-5.5".into(),
            exec_timeout: 3600,
            report_timeout: 300,
            auto_report: false,
        }
    }
}
