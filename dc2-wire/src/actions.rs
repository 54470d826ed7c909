//! The action vocabulary this emulator answers, and which wire dialect
//! each belongs to (`spec.md` §2, §6).

use crate::xml::Dialect;

macro_rules! actions {
    (ec2: [$($ec2:ident),* $(,)?], autoscaling: [$($asg:ident),* $(,)?]) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Action {
            $($ec2,)*
            $($asg,)*
        }

        impl Action {
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($ec2) => Some(Action::$ec2),)*
                    $(stringify!($asg) => Some(Action::$asg),)*
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Action::$ec2 => stringify!($ec2),)*
                    $(Action::$asg => stringify!($asg),)*
                }
            }

            pub fn dialect(&self) -> Dialect {
                match self {
                    $(Action::$ec2 => Dialect::Ec2,)*
                    $(Action::$asg => Dialect::AutoScaling,)*
                }
            }
        }
    };
}

actions! {
    ec2: [
        RunInstances,
        DescribeInstances,
        DescribeInstanceStatus,
        StartInstances,
        StopInstances,
        RebootInstances,
        TerminateInstances,
        ModifyInstanceMetadataOptions,
        DescribeInstanceAttribute,
        ModifyInstanceAttribute,
        CreateTags,
        DeleteTags,
        CreateVolume,
        DeleteVolume,
        AttachVolume,
        DetachVolume,
        DescribeVolumes,
        ModifyVolumeAttribute,
        CreateLaunchTemplate,
        CreateLaunchTemplateVersion,
        DescribeLaunchTemplates,
        DescribeLaunchTemplateVersions,
        DeleteLaunchTemplate,
        DeleteLaunchTemplateVersions,
        DescribeSpotInstanceRequests,
        CancelSpotInstanceRequests,
        DescribeSpotPriceHistory,
    ],
    autoscaling: [
        CreateAutoScalingGroup,
        UpdateAutoScalingGroup,
        DeleteAutoScalingGroup,
        DescribeAutoScalingGroups,
        SetDesiredCapacity,
        DetachInstances,
        PutWarmPool,
        DeleteWarmPool,
        DescribeWarmPool,
    ],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_names() {
        assert_eq!(Action::from_name("RunInstances"), Some(Action::RunInstances));
        assert_eq!(Action::RunInstances.name(), "RunInstances");
        assert_eq!(Action::RunInstances.dialect(), Dialect::Ec2);
        assert_eq!(Action::CreateAutoScalingGroup.dialect(), Dialect::AutoScaling);
    }

    #[test]
    fn unknown_action_name_is_none() {
        assert_eq!(Action::from_name("DoesNotExist"), None);
    }
}
