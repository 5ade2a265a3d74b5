// This module resolves the compilation target. A target is described by a quadruple of the
// form arch-vendor-system-environment, where everything after the architecture is optional.
// Resolution takes the optional quadruple and architecture flags: a quadruple, when present,
// is parsed and wins outright; otherwise a bare architecture name is used and the remaining
// fields are left for the backend to default; with neither, the host the crate was built for
// is used. ARM-family architecture tokens carry their sub-architecture inline (armv7a), which
// is split off so backends can match on the family name alone.

//! Target descriptor resolution.

use crate::core::{CompileError, CompileResult};
use std::fmt;

/// Where a descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    Quadruple,
    Architecture,
    Host,
}

/// Resolved target identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub arch: String,
    pub sub_arch: Option<String>,
    pub vendor: Option<String>,
    pub system: Option<String>,
    pub environment: Option<String>,
    pub origin: TargetOrigin,
}

const SUB_ARCH_FAMILIES: &[&str] = &["armeb", "arm", "thumb"];

impl TargetDescriptor {
    /// Descriptor for a bare architecture name.
    pub fn from_arch(arch: &str) -> CompileResult<Self> {
        if arch.is_empty() {
            return Err(CompileError::TargetUnresolvable {
                reason: "architecture name is empty".to_string(),
            });
        }
        if !is_token(arch) {
            return Err(CompileError::TargetUnresolvable {
                reason: format!("invalid architecture name '{arch}'"),
            });
        }
        let (arch, sub_arch) = split_sub_arch(arch);
        Ok(Self {
            arch,
            sub_arch,
            vendor: None,
            system: None,
            environment: None,
            origin: TargetOrigin::Architecture,
        })
    }

    /// The full quadruple, with `unknown` for missing fields.
    pub fn quadruple(&self) -> String {
        self.to_string()
    }

    pub fn is_host(&self) -> bool {
        self.origin == TargetOrigin::Host
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.arch, self.sub_arch.as_deref().unwrap_or(""))?;
        let rest = [&self.vendor, &self.system, &self.environment];
        let present = rest.iter().rposition(|field| field.is_some()).map_or(0, |i| i + 1);
        for field in &rest[..present] {
            write!(f, "-{}", field.as_deref().unwrap_or("unknown"))?;
        }
        Ok(())
    }
}

fn is_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn split_sub_arch(token: &str) -> (String, Option<String>) {
    for family in SUB_ARCH_FAMILIES {
        if let Some(rest) = token.strip_prefix(family) {
            if rest.starts_with('v') && rest.len() > 1 {
                return (family.to_string(), Some(rest.to_string()));
            }
        }
    }
    (token.to_string(), None)
}

/// Parse `arch[-vendor[-system[-environment]]]`.
pub fn parse_quadruple(quadruple: &str) -> CompileResult<TargetDescriptor> {
    let malformed = |reason: &str| CompileError::MalformedQuadruple {
        quadruple: quadruple.to_string(),
        reason: reason.to_string(),
    };

    let tokens: Vec<&str> = quadruple.split('-').collect();
    if tokens.len() > 4 {
        return Err(malformed("more than four components"));
    }
    if let Some(bad) = tokens.iter().position(|t| !is_token(t)) {
        return Err(match bad {
            0 => malformed("missing architecture"),
            _ => malformed("empty or invalid component"),
        });
    }

    let (arch, sub_arch) = split_sub_arch(tokens[0]);
    let field = |i: usize| tokens.get(i).map(|t| t.to_string());
    Ok(TargetDescriptor {
        arch,
        sub_arch,
        vendor: field(1),
        system: field(2),
        environment: field(3),
        origin: TargetOrigin::Quadruple,
    })
}

/// Descriptor of the machine this crate was built for.
pub fn host() -> TargetDescriptor {
    let vendor = if cfg!(target_vendor = "apple") {
        "apple"
    } else if cfg!(target_vendor = "pc") {
        "pc"
    } else {
        "unknown"
    };
    let environment = if cfg!(target_env = "gnu") {
        Some("gnu")
    } else if cfg!(target_env = "musl") {
        Some("musl")
    } else if cfg!(target_env = "msvc") {
        Some("msvc")
    } else {
        None
    };
    TargetDescriptor {
        arch: std::env::consts::ARCH.to_string(),
        sub_arch: None,
        vendor: Some(vendor.to_string()),
        system: Some(std::env::consts::OS.to_string()),
        environment: environment.map(str::to_string),
        origin: TargetOrigin::Host,
    }
}

/// Resolve the target from the optional quadruple and architecture flags.
///
/// A quadruple wins over an architecture; with neither the host is used.
pub fn resolve(quadruple: Option<&str>, arch: Option<&str>) -> CompileResult<TargetDescriptor> {
    let target = match (quadruple, arch) {
        (Some(quadruple), ignored) => {
            if let Some(arch) = ignored {
                log::debug!("Quadruple '{}' overrides architecture '{}'", quadruple, arch);
            }
            parse_quadruple(quadruple)?
        }
        (None, Some(arch)) => TargetDescriptor::from_arch(arch)?,
        (None, None) => host(),
    };
    log::debug!("Resolved target {} ({:?})", target, target.origin);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadruple_wins_over_arch() {
        let target = resolve(Some("arm-none-eabi"), Some("x86")).unwrap();
        assert_eq!(target.arch, "arm");
        assert_eq!(target.vendor.as_deref(), Some("none"));
        assert_eq!(target.system.as_deref(), Some("eabi"));
        assert_eq!(target.origin, TargetOrigin::Quadruple);
    }

    #[test]
    fn test_arch_only() {
        let target = resolve(None, Some("x86_64")).unwrap();
        assert_eq!(target.arch, "x86_64");
        assert_eq!(target.vendor, None);
        assert_eq!(target.origin, TargetOrigin::Architecture);
        assert_eq!(target.to_string(), "x86_64");
    }

    #[test]
    fn test_neither_flag_is_host() {
        let target = resolve(None, None).unwrap();
        assert_eq!(target, host());
        assert_eq!(target.arch, std::env::consts::ARCH);
        assert!(target.is_host());
    }

    #[test]
    fn test_sub_arch_split() {
        let target = parse_quadruple("armv7a-unknown-linux-gnueabihf").unwrap();
        assert_eq!(target.arch, "arm");
        assert_eq!(target.sub_arch.as_deref(), Some("v7a"));
        assert_eq!(target.environment.as_deref(), Some("gnueabihf"));
        assert_eq!(target.quadruple(), "armv7a-unknown-linux-gnueabihf");

        let target = parse_quadruple("aarch64").unwrap();
        assert_eq!(target.sub_arch, None);
    }

    #[test]
    fn test_malformed_quadruples() {
        for bad in ["", "-linux", "x86_64--linux", "a-b-c-d-e", "x86 64"] {
            assert!(
                matches!(parse_quadruple(bad), Err(CompileError::MalformedQuadruple { .. })),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_empty_arch_unresolvable() {
        assert!(matches!(
            resolve(None, Some("")),
            Err(CompileError::TargetUnresolvable { .. })
        ));
    }

    #[test]
    fn test_display_fills_gaps() {
        let target = TargetDescriptor {
            system: Some("linux".to_string()),
            ..TargetDescriptor::from_arch("riscv64").unwrap()
        };
        assert_eq!(target.to_string(), "riscv64-unknown-linux");
    }
}
