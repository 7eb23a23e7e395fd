use chrono::{DateTime, Utc};

/// Placeholder substituted with the extension implied by the chosen
/// compression (and, later, encryption) before any strftime expansion.
const EXTENSION_PLACEHOLDER: &str = "{{ .Extension }}";
/// Placeholder substituted with the machine's hostname.
const HOSTNAME_PLACEHOLDER: &str = "{{ .Hostname }}";

/// Renders a backup filename template.
///
/// When `expand` is false the template is returned unchanged except for
/// the `{{ .Extension }}`/`{{ .Hostname }}` substitutions, which always
/// happen: a literal filename still needs to know what extension the
/// archive ended up with and what host produced it.
pub fn render_filename(
  template: &str,
  expand: bool,
  extension: &str,
  now: DateTime<Utc>,
) -> String {
  let with_extension = template.replace(EXTENSION_PLACEHOLDER, extension);
  let with_hostname = with_extension.replace(HOSTNAME_PLACEHOLDER, &hostname());
  if expand {
    now.format(&with_hostname).to_string()
  } else {
    with_hostname
  }
}

fn hostname() -> String {
  gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 3, 0, 0).unwrap()
  }

  #[test]
  fn literal_filename_only_substitutes_extension() {
    let name = render_filename("b.tar.gz", false, "tar.gz", fixed_time());
    assert_eq!(name, "b.tar.gz");
  }

  #[test]
  fn expanded_filename_applies_strftime_and_extension() {
    let name = render_filename(
      "backup-%Y-%m-%d{{ .Extension }}",
      true,
      ".tar.zst",
      fixed_time(),
    );
    assert_eq!(name, "backup-2026-08-01.tar.zst");
  }

  #[test]
  fn idempotent_for_same_template_and_time() {
    let a = render_filename("%Y%m%d{{ .Extension }}", true, ".tar.gz", fixed_time());
    let b = render_filename("%Y%m%d{{ .Extension }}", true, ".tar.gz", fixed_time());
    assert_eq!(a, b);
  }
}
