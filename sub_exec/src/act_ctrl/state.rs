//! Implementations for the ActCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use super::{
    calc_mix, ActCtrlError, AxisFunc, ButtonFunc, ControlIntent, Params, AXIS_RAW_MAX, AXIS_RAW_MIN,
};
use crate::actuator::Thruster;
use util::{module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Actuation control module state
#[derive(Default)]
pub struct ActCtrl {
    pub(crate) params: Params,

    /// Whether the light is currently on.
    lights_on: bool,

    /// Last commanded light duty, reapplied when the light is toggled back
    /// on.
    light_duty: u8,
}

/// Input data to Actuation Control.
pub struct InputData {
    /// The intent to translate, or `None` if no new event arrived this cycle.
    pub intent: Option<ControlIntent>,

    /// Whether the enable interlock currently permits actuation.
    pub enabled: bool,
}

/// Output demands that the actuator sink must apply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputData {
    /// Thruster duty demands, empty if no thruster is affected this cycle.
    pub thruster_dems: Vec<(Thruster, u8)>,

    /// Light duty demand, `None` if the light is unaffected this cycle.
    pub light_dem: Option<u8>,
}

/// Status report for ActCtrl processing.
#[derive(Clone, Copy, Default, Debug)]
pub struct StatusReport {
    /// The intent was rejected because the interlock is disabled.
    pub rejected: bool,

    /// A light adjustment hit its bound and was not applied.
    pub light_limited: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ActCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = ActCtrlError;

    /// Initialise the ActCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session) -> Result<(), Self::InitError> {
        self.params = params::load(init_data)?;

        self.lights_on = false;
        self.light_duty = self.params.light_initial_duty;

        Ok(())
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut output = OutputData::default();
        let mut report = StatusReport::default();

        let intent = match input_data.intent {
            Some(i) => i,
            None => return Ok((output, report)),
        };

        // The interlock gates everything this module handles. The enable
        // toggle itself never reaches here, the exec routes it straight to
        // the interlock.
        if !input_data.enabled {
            info!("Soft disable active, ignoring {:?}", intent);
            report.rejected = true;
            return Ok((output, report));
        }

        match intent {
            ControlIntent::Axis(func, raw) => {
                let raw = raw as i64;
                if !(AXIS_RAW_MIN..=AXIS_RAW_MAX).contains(&raw) {
                    return Err(ActCtrlError::AxisOutOfRange(raw as i32));
                }

                output.thruster_dems = Self::mix_axis(func, raw);
            }
            ControlIntent::Button(func) => {
                self.proc_light_button(func, &mut output, &mut report);
            }
        }

        Ok((output, report))
    }
}

impl ActCtrl {
    /// The loaded parameters, including the event bindings.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mix one axis deflection onto its thruster pair.
    fn mix_axis(func: AxisFunc, raw: i64) -> Vec<(Thruster, u8)> {
        match func {
            AxisFunc::FwdBk => {
                let duty = calc_mix::fwdbk_duty(raw);
                vec![(Thruster::One, duty), (Thruster::Four, duty)]
            }
            AxisFunc::Rotate => {
                let (one, four) = calc_mix::differential_duty(raw);
                vec![(Thruster::One, one), (Thruster::Four, four)]
            }
            AxisFunc::UpDown => {
                let duty = calc_mix::updwn_duty(raw);
                vec![(Thruster::Two, duty), (Thruster::Three, duty)]
            }
            AxisFunc::Roll => {
                let (two, three) = calc_mix::differential_duty(raw);
                vec![(Thruster::Two, two), (Thruster::Three, three)]
            }
        }
    }

    /// Handle a light button press.
    fn proc_light_button(
        &mut self,
        func: ButtonFunc,
        output: &mut OutputData,
        report: &mut StatusReport,
    ) {
        match func {
            ButtonFunc::LightsToggle => {
                self.lights_on = !self.lights_on;

                if self.lights_on {
                    info!("Lights on at duty {}", self.light_duty);
                    output.light_dem = Some(self.light_duty);
                } else {
                    info!("Lights off");
                    output.light_dem = Some(0);
                }
            }
            ButtonFunc::LightsDim => {
                if self.light_duty <= self.params.light_min_duty {
                    warn!("Light already at minimum duty, no change");
                    report.light_limited = true;
                    return;
                }

                self.light_duty =
                    (self.light_duty - self.params.light_step).max(self.params.light_min_duty);
                info!("Light duty dimmed to {}", self.light_duty);

                if self.lights_on {
                    output.light_dem = Some(self.light_duty);
                }
            }
            ButtonFunc::LightsBright => {
                if self.light_duty >= self.params.light_max_duty {
                    warn!("Light already at maximum duty, no change");
                    report.light_limited = true;
                    return;
                }

                self.light_duty =
                    (self.light_duty + self.params.light_step).min(self.params.light_max_duty);
                info!("Light duty brightened to {}", self.light_duty);

                if self.lights_on {
                    output.light_dem = Some(self.light_duty);
                }
            }
            ButtonFunc::EnableToggle => {
                // Routed by the exec before proc is called; arriving here
                // means a routing bug upstream
                warn!("Enable toggle reached actuation control, ignoring");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn act_ctrl() -> ActCtrl {
        let mut ctrl = ActCtrl::default();
        ctrl.params = Params {
            light_initial_duty: 60,
            light_step: 10,
            light_min_duty: 10,
            light_max_duty: 100,
            bindings: Default::default(),
        };
        ctrl.light_duty = ctrl.params.light_initial_duty;
        ctrl
    }

    fn proc(
        ctrl: &mut ActCtrl,
        intent: ControlIntent,
        enabled: bool,
    ) -> (OutputData, StatusReport) {
        ctrl.proc(&InputData {
            intent: Some(intent),
            enabled,
        })
        .unwrap()
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let mut ctrl = act_ctrl();

        let (output, report) = proc(
            &mut ctrl,
            ControlIntent::Axis(AxisFunc::FwdBk, AXIS_RAW_MIN as i32),
            false,
        );

        assert!(report.rejected);
        assert!(output.thruster_dems.is_empty());
        assert!(output.light_dem.is_none());
    }

    #[test]
    fn test_no_intent_is_noop() {
        let mut ctrl = act_ctrl();

        let (output, report) = ctrl
            .proc(&InputData {
                intent: None,
                enabled: true,
            })
            .unwrap();

        assert!(!report.rejected);
        assert_eq!(output, OutputData::default());
    }

    #[test]
    fn test_fwdbk_drives_horizontal_pair() {
        let mut ctrl = act_ctrl();

        let (output, _) = proc(
            &mut ctrl,
            ControlIntent::Axis(AxisFunc::FwdBk, AXIS_RAW_MIN as i32),
            true,
        );

        assert_eq!(
            output.thruster_dems,
            vec![(Thruster::One, 100), (Thruster::Four, 100)]
        );
    }

    #[test]
    fn test_rotate_splits_horizontal_pair() {
        let mut ctrl = act_ctrl();

        let (output, _) = proc(
            &mut ctrl,
            ControlIntent::Axis(AxisFunc::Rotate, AXIS_RAW_MAX as i32),
            true,
        );

        assert_eq!(
            output.thruster_dems,
            vec![(Thruster::One, 75), (Thruster::Four, 25)]
        );
    }

    #[test]
    fn test_roll_splits_vertical_pair() {
        let mut ctrl = act_ctrl();

        let (output, _) = proc(
            &mut ctrl,
            ControlIntent::Axis(AxisFunc::Roll, AXIS_RAW_MIN as i32),
            true,
        );

        assert_eq!(
            output.thruster_dems,
            vec![(Thruster::Two, 25), (Thruster::Three, 75)]
        );
    }

    #[test]
    fn test_centred_axes_are_neutral() {
        let mut ctrl = act_ctrl();

        for func in &[AxisFunc::FwdBk, AxisFunc::Rotate, AxisFunc::UpDown, AxisFunc::Roll] {
            let (output, _) = proc(&mut ctrl, ControlIntent::Axis(*func, 0), true);

            for (_, duty) in &output.thruster_dems {
                assert_eq!(*duty, 50, "axis {:?}", func);
            }
        }
    }

    #[test]
    fn test_light_toggle_cycle() {
        let mut ctrl = act_ctrl();

        let (output, _) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);
        assert_eq!(output.light_dem, Some(60));

        let (output, _) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);
        assert_eq!(output.light_dem, Some(0));

        // Back on at the remembered duty
        let (output, _) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);
        assert_eq!(output.light_dem, Some(60));
    }

    #[test]
    fn test_light_dim_bounds() {
        let mut ctrl = act_ctrl();
        proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);

        // 60 -> 50 -> 40 -> 30 -> 20 -> 10, then limited
        for expected in &[50u8, 40, 30, 20, 10] {
            let (output, report) =
                proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsDim), true);
            assert_eq!(output.light_dem, Some(*expected));
            assert!(!report.light_limited);
        }

        let (output, report) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsDim), true);
        assert!(output.light_dem.is_none());
        assert!(report.light_limited);
    }

    #[test]
    fn test_light_bright_bounds() {
        let mut ctrl = act_ctrl();
        proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);

        for expected in &[70u8, 80, 90, 100] {
            let (output, report) =
                proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsBright), true);
            assert_eq!(output.light_dem, Some(*expected));
            assert!(!report.light_limited);
        }

        let (output, report) =
            proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsBright), true);
        assert!(output.light_dem.is_none());
        assert!(report.light_limited);
    }

    #[test]
    fn test_light_adjust_while_off_is_remembered() {
        let mut ctrl = act_ctrl();

        // Dim twice while off: no demand goes out, but the duty sticks
        let (output, _) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsDim), true);
        assert!(output.light_dem.is_none());
        proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsDim), true);

        let (output, _) = proc(&mut ctrl, ControlIntent::Button(ButtonFunc::LightsToggle), true);
        assert_eq!(output.light_dem, Some(40));
    }
}
