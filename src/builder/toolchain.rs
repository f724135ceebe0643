//! Make variables contributed by toolchains.
//!
//! Rules with a `toolchains` attribute may use the variables those
//! toolchains define in their commands. The C++ toolchain is built in and
//! maps onto the compiler CMake was configured with; any other toolchain must
//! be a target publishing a `TemplateVariables` provider.

use crate::builder::context::AnalysisContext;
use crate::builder::error::{AnalysisError, SubstitutionError};
use crate::builder::substitution::MakeVariables;
use crate::core::label::TargetId;

/// Label of the built-in C++ toolchain.
pub const CURRENT_CC_TOOLCHAIN: &str = "@bazel_tools//tools/cpp:current_cc_toolchain";

/// Make variable → CMake variable reference for the C++ toolchain.
const CC_TOOLCHAIN_VARIABLES: &[(&str, &str)] = &[
    ("CC", "${CMAKE_C_COMPILER}"),
    ("CC_FLAGS", "${CMAKE_C_FLAGS}"),
    ("AR", "${CMAKE_AR}"),
    ("NM", "${CMAKE_NM}"),
    ("OBJCOPY", "${CMAKE_OBJCOPY}"),
    ("STRIP", "${CMAKE_STRIP}"),
];

/// Merge the variables of `toolchains` over `substitutions`.
///
/// Later toolchains override earlier ones, and every toolchain overrides the
/// rule's own variables.
pub fn get_toolchain_substitutions(
    ctx: &mut AnalysisContext<'_>,
    toolchains: &[TargetId],
    substitutions: &MakeVariables,
) -> Result<MakeVariables, AnalysisError> {
    let mut merged = substitutions.clone();
    for toolchain in toolchains {
        if toolchain.as_label() == CURRENT_CC_TOOLCHAIN {
            merged.extend(
                CC_TOOLCHAIN_VARIABLES
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
            continue;
        }
        let info = ctx.get_target_info(toolchain)?;
        let variables = info.template_variables().ok_or_else(|| {
            SubstitutionError::MissingToolchainVariables {
                label: toolchain.as_label(),
            }
        })?;
        merged.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{Provider, TargetInfo};
    use crate::test_support::TestRepo;

    #[test]
    fn test_cc_toolchain_variables() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":gen", |ctx| {
            let cc = TargetId::parse(CURRENT_CC_TOOLCHAIN)?;
            let mut base = MakeVariables::new();
            base.insert("CC".into(), "cc".into());
            base.insert("OUTS".into(), "\"o\"".into());
            let merged = get_toolchain_substitutions(ctx, &[cc], &base)?;
            assert_eq!(merged["CC"], "${CMAKE_C_COMPILER}");
            assert_eq!(merged["OUTS"], "\"o\"");
            Ok(())
        });
    }

    #[test]
    fn test_custom_toolchain_variables() {
        let mut repo = TestRepo::new();
        repo.add_info(
            "@repo//tools:python",
            TargetInfo::new([Provider::TemplateVariables {
                variables: [("PYTHON3".to_string(), "${Python3_EXECUTABLE}".to_string())]
                    .into_iter()
                    .collect(),
            }]),
        );
        repo.add_files("@repo//tools:not_a_toolchain", &["x"]);
        repo.analyze_with(":gen", |ctx| {
            let python = TargetId::parse("@repo//tools:python")?;
            let merged = get_toolchain_substitutions(ctx, &[python], &MakeVariables::new())?;
            assert_eq!(merged["PYTHON3"], "${Python3_EXECUTABLE}");

            let bad = TargetId::parse("@repo//tools:not_a_toolchain")?;
            let err = get_toolchain_substitutions(ctx, &[bad], &MakeVariables::new()).unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::Substitution(SubstitutionError::MissingToolchainVariables { .. })
            ));
            Ok(())
        });
    }
}
