//! Init command implementation
//!
//! Writes a sample configuration file reproducing the default deployment.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "dicom-deid.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        match fs::write(&self.output, sample_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your directories and tags", self.output);
                println!("  2. Validate configuration: dicom-deid validate-config");
                println!("  3. Inspect the compiled rules: dicom-deid rules");
                println!("  4. Run a batch: dicom-deid run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

/// Sample configuration with every section and its default values
pub fn sample_config() -> &'static str {
    r#"# dicom-deid configuration
# ${VAR} references are substituted from the environment; any key can also be
# overridden with DEID_<SECTION>_<KEY>, e.g. DEID_APPLICATION_WORKERS=8.

[application]
log_level = "info"          # trace | debug | info | warn | error
# workers = 8               # default: available parallelism (max 16)

[directories]
input = "data/raw"
output = "data/anonymized"
quarantine = "data/quarantine"
logs = "logs"
audit = "audit_logs"

[anonymization]
# HIPAA Safe Harbor baseline; every keyword must exist in the DICOM dictionary
hipaa_tags = [
    "PatientName", "PatientID", "PatientBirthDate", "PatientBirthTime",
    "PatientSex", "PatientAddress", "PatientTelephoneNumbers",
    "OtherPatientNames", "OtherPatientIDsSequence", "PatientMotherBirthName",
    "InstitutionName", "InstitutionAddress", "InstitutionalDepartmentName",
    "ReferringPhysicianName", "ReferringPhysicianAddress",
    "ReferringPhysicianTelephoneNumbers", "PhysiciansOfRecord",
    "PerformingPhysicianName", "NameOfPhysiciansReadingStudy", "OperatorsName",
    "AccessionNumber", "StudyID", "StationName", "DeviceSerialNumber",
]

# Extra removals by keyword and/or explicit group/element
additional_tags = [
    # { name = "StudyDescription" },
    # { group = 0x0009, element = 0x0010 },
]

# Fixed replacements; a tag listed here is replaced even if also removed
replace_tags = [
    { name = "PatientName", value = "ANONYMOUS" },
    { name = "InstitutionName", value = "ANONYMOUS_INSTITUTION" },
    { name = "ReferringPhysicianName", value = "ANONYMOUS_PHYSICIAN" },
]

[validation]
verify_after_write = true
check_permissions = true
integrity_check = true
phi_check = true

[security]
encryption_key_path = "config/encryption.key"
file_permissions = 0o600
dir_permissions = 0o700

[engine]
kind = "builtin"            # builtin | external
# program = "/opt/anonymizer/bin/anonymize"
# args = ["--script", "{script}", "{input}", "{output}"]
script_path = "config/anonymization.script"
timeout_seconds = 300

[logging]
local_enabled = true
local_rotation = "daily"    # daily | hourly | never
"#
}
