//! The full acquisition chain: particles, optical pulses, detectors,
//! amplifier, analog processing, triggering, digitization and peak
//! detection.
use crate::coupling::GaussianBeam;
use crate::detector::{apply_source_noise, Detector, TransimpedanceAmplifier};
use crate::digitizer::{CaptureMetadata, Digitizer};
use crate::error::{Error, Result};
use crate::filter::AnalogFilter;
use crate::flow_cell::FlowCell;
use crate::peak::{PeakLocator, PeakTable};
use crate::population::Population;
use crate::sampler::{sample_population, Channel, SamplingContext};
use crate::settings::SimulationSettings;
use crate::signal::SignalGenerator;
use crate::timeline::{ArrivalScheme, BinAmplitude, EventCollection, PopulationEvents, TimelineGenerator};
use crate::trigger::{Segment, TriggeredAcquisition, TriggeringSystem};
use crate::units::{seconds, watts};
use bon::bon;
use log::debug;
use rand::Rng;
use uom::si::f64::{Power, Time};
use uom::si::power::watt;

/// A trait that defines the interface for an observer of the acquisition
/// chain.
///
/// The default implementation of all methods is a no-op. Users are expected to
/// override the methods they are interested in.
#[allow(unused_variables)]
pub trait Observer {
    /// Called when a population produced events.
    fn on_population_sampled(&mut self, events: &PopulationEvents) {}
    /// Called when a population expects no events over the run.
    fn on_population_skipped(&mut self, population: &Population, expected_events: f64) {}
    /// Called once the analog signal of every detector is complete.
    fn on_signal_generated(&mut self, signal: &SignalGenerator) {}
    /// Called for every triggered segment, in acquisition order.
    fn on_segment(&mut self, segment: &Segment) {}
}

impl Observer for () {}

/// Everything produced by one [`FlowCytometer::run`].
#[derive(Clone, Debug)]
pub struct Acquisition {
    /// [s]
    pub run_time: f64,
    pub events: EventCollection,
    /// Detector voltages [V] after analog processing.
    pub analog: SignalGenerator,
    /// Digitizer output, one channel per detector.
    pub digital: SignalGenerator,
    /// Saturation levels and clipping of every digitized channel.
    pub capture: Vec<(String, CaptureMetadata)>,
    /// Analog segments, if a triggering system is configured.
    pub triggered: Option<TriggeredAcquisition>,
    /// Peaks of the digitized segments, if a peak locator is configured.
    pub peaks: Option<PeakTable>,
}

pub struct FlowCytometer<O> {
    populations: Vec<Population>,
    detectors: Vec<Detector>,
    analog_filters: Vec<AnalogFilter>,
    flow_cell: FlowCell,
    beam: GaussianBeam,
    amplifier: TransimpedanceAmplifier,
    digitizer: Digitizer,
    /// [W]
    background_power: f64,
    medium_refractive_index: f64,
    settings: SimulationSettings,
    arrival_scheme: ArrivalScheme,
    baseline_restoration: bool,
    baseline_window: Option<usize>,
    source_rin: f64,
    triggering_system: Option<TriggeringSystem>,
    peak_locator: Option<Box<dyn PeakLocator>>,
    observer: O,
}

#[bon]
impl<O> FlowCytometer<O> {
    /// Returns an error if no detector is configured, if two detectors share
    /// a name, or if the triggering system refers to an unknown detector.
    #[builder]
    pub fn new(
        #[builder(field)] populations: Vec<Population>,
        #[builder(field)] detectors: Vec<Detector>,
        #[builder(field)] analog_filters: Vec<AnalogFilter>,
        flow_cell: FlowCell,
        beam: GaussianBeam,
        amplifier: TransimpedanceAmplifier,
        digitizer: Digitizer,
        #[builder(default = Power::new::<watt>(0.0))] background_power: Power,
        #[builder(default = 1.33)] medium_refractive_index: f64,
        #[builder(default)] settings: SimulationSettings,
        #[builder(default)] arrival_scheme: ArrivalScheme,
        // Running-minimum baseline subtraction; `baseline_window` of `None`
        // takes the minimum over the whole history.
        #[builder(default)] baseline_restoration: bool,
        baseline_window: Option<usize>,
        // Relative intensity noise of the source [1/Hz].
        #[builder(default = 0.0)] source_rin: f64,
        triggering_system: Option<TriggeringSystem>,
        peak_locator: Option<Box<dyn PeakLocator>>,
        observer: O,
    ) -> Result<Self> {
        if detectors.is_empty() {
            return Err(Error::invalid("detectors", "at least one detector is required"));
        }
        for (i, detector) in detectors.iter().enumerate() {
            if detectors[..i].iter().any(|d| d.name() == detector.name()) {
                return Err(Error::invalid(
                    "detectors",
                    format!("detector name `{}` is used twice", detector.name()),
                ));
            }
        }
        if let Some(trigger) = &triggering_system {
            if !detectors.iter().any(|d| d.name() == trigger.trigger_detector()) {
                return Err(Error::UnknownChannel(trigger.trigger_detector().to_string()));
            }
        }

        Ok(Self {
            populations,
            detectors,
            analog_filters,
            flow_cell,
            beam,
            amplifier,
            digitizer,
            background_power: watts(background_power),
            medium_refractive_index,
            settings,
            arrival_scheme,
            baseline_restoration,
            baseline_window,
            source_rin,
            triggering_system,
            peak_locator,
            observer,
        })
    }
}

impl<O, S: flow_cytometer_builder::State> FlowCytometerBuilder<O, S> {
    /// Add a particle population to the [`FlowCytometer`].
    pub fn add_population(mut self, population: Population) -> Self {
        self.populations.push(population);
        self
    }
    /// Add a detector to the [`FlowCytometer`]. Detectors are simulated in
    /// the order they are added; the first one with a non-zero mean
    /// amplitude is the reference channel of gamma-sampled populations.
    pub fn add_detector(mut self, detector: Detector) -> Self {
        self.detectors.push(detector);
        self
    }
    /// Add an analog filter applied to every detector voltage after
    /// amplification.
    pub fn add_analog_filter(mut self, filter: AnalogFilter) -> Self {
        self.analog_filters.push(filter);
        self
    }
}

impl<O> FlowCytometer<O> {
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }
}

impl<O: Observer> FlowCytometer<O> {
    /// Simulate an acquisition of `run_time`.
    pub fn run<R: Rng + ?Sized>(&mut self, run_time: Time, rng: &mut R) -> Result<Acquisition> {
        let run_time_s = seconds(run_time);
        let sampling_rate = self.digitizer.sampling_rate();
        let bandwidth = self.digitizer.bandwidth();

        let mut analog = SignalGenerator::new(self.digitizer.get_time_series(run_time))?;
        for detector in &self.detectors {
            analog.create_zero_signal(detector.name());
        }

        let events = self.sample_events(run_time_s, sampling_rate, rng)?;
        self.synthesize(&events, &mut analog, rng)?;

        for detector in &self.detectors {
            apply_source_noise(
                &mut analog,
                detector.name(),
                self.source_rin,
                bandwidth,
                &self.settings,
                rng,
            )?;
            detector.transform_power_to_current(
                &mut analog,
                self.beam.wavelength,
                bandwidth,
                &self.settings,
                rng,
            )?;
            detector.apply_dark_current_noise(&mut analog, bandwidth, &self.settings, rng)?;
        }
        self.amplifier.amplify(&mut analog, sampling_rate, &self.settings, rng)?;

        for filter in &self.analog_filters {
            analog.apply_filter(filter, sampling_rate, None)?;
        }
        if self.baseline_restoration {
            analog.apply_baseline_restoration(self.baseline_window, None)?;
        }
        self.observer.on_signal_generated(&analog);

        let triggered = match &self.triggering_system {
            Some(trigger) => {
                let triggered = trigger.run(&analog)?;
                for segment in triggered.segments() {
                    self.observer.on_segment(segment);
                }
                Some(triggered)
            }
            None => None,
        };

        let mut digital = SignalGenerator::new(analog.get_time().to_vec())?;
        let mut capture = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            let (digitized, metadata) = self
                .digitizer
                .capture_signal(analog.get_signal(detector.name())?, &self.settings);
            digital.set_signal(detector.name(), digitized)?;
            capture.push((detector.name().to_string(), metadata));
        }

        let peaks = match (&triggered, &self.peak_locator) {
            (Some(triggered), Some(locator)) => Some(locator.run(&triggered.apply_to(&digital)?)?),
            _ => None,
        };

        Ok(Acquisition {
            run_time: run_time_s,
            events,
            analog,
            digital,
            capture,
            triggered,
            peaks,
        })
    }

    fn sample_events<R: Rng + ?Sized>(
        &mut self,
        run_time: f64,
        sampling_rate: f64,
        rng: &mut R,
    ) -> Result<EventCollection> {
        let channels: Vec<Channel<'_>> = self
            .detectors
            .iter()
            .map(|d| Channel {
                name: d.name(),
                coupling: d.coupling(),
            })
            .collect();
        let context = SamplingContext {
            channels: &channels,
            beam: &self.beam,
            medium_refractive_index: self.medium_refractive_index,
            sampling_rate,
            run_time,
            perfect_focusing: self.settings.assume_perfect_hydrodynamic_focusing,
        };
        let generator = TimelineGenerator::new(&self.flow_cell, run_time, self.arrival_scheme, self.settings);

        let mut events = EventCollection::new(self.detectors.iter().map(|d| d.name().to_string()).collect());
        for population in &self.populations {
            let timeline = generator.sample(population, rng)?;
            let expected_events = timeline.expected_events();
            match sample_population(population, timeline, &self.flow_cell, &context, rng)? {
                Some(sampled) => {
                    self.observer.on_population_sampled(&sampled);
                    events.push(sampled);
                }
                None => self.observer.on_population_skipped(population, expected_events),
            }
        }
        Ok(events)
    }

    /// Optical power on every detector: background, explicit pulses and
    /// gamma traces.
    fn synthesize<R: Rng + ?Sized>(
        &self,
        events: &EventCollection,
        analog: &mut SignalGenerator,
        rng: &mut R,
    ) -> Result<()> {
        let explicit: Vec<_> = events.iter().flat_map(|p| &p.events).collect();
        let centers: Vec<f64> = explicit.iter().map(|e| e.time).collect();
        let widths: Vec<f64> = explicit.iter().map(|e| e.width).collect();

        for (j, detector) in self.detectors.iter().enumerate() {
            let amplitudes: Vec<f64> = explicit.iter().map(|e| e.amplitudes[j]).collect();
            analog.generate_pulses_to_signal(
                detector.name(),
                &centers,
                &widths,
                &amplitudes,
                self.background_power,
            )?;
        }

        let sampling_rate = self.digitizer.sampling_rate();
        for population in events {
            let Some(aggregate) = &population.aggregate else {
                continue;
            };
            // The first detector with a non-degenerate amplitude carries the draw.
            let Some((reference, shape, scale)) =
                aggregate.channels.iter().find_map(|channel| match channel.bin_amplitude {
                    BinAmplitude::Gamma { shape, scale } => Some((channel, shape, scale)),
                    BinAmplitude::Degenerate => None,
                })
            else {
                debug!(
                    "population `{}` has degenerate amplitudes on every detector, no trace added",
                    population.name
                );
                continue;
            };

            let sigma = aggregate.mean_pulse_width * sampling_rate;
            let trace = analog.add_gamma_trace_to_signal(&reference.detector, shape, scale, sigma, rng)?;
            for channel in aggregate.channels.iter().filter(|c| c.detector != reference.detector) {
                let ratio = channel.mean_amplitude / reference.mean_amplitude;
                let scaled: Vec<f64> = trace.iter().map(|x| x * ratio).collect();
                analog.add_array_to_signal(&channel.detector, &scaled)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::UniformCoupling;
    use crate::digitizer::BitDepth;
    use crate::distribution::Distribution;
    use crate::peak::GlobalPeakLocator;
    use crate::population::{ParticleCount, SamplingMethod};
    use crate::trigger::Threshold;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uom::si::electrical_resistance::ohm;
    use uom::si::f64::{ElectricalResistance, Frequency, Length, VolumeRate};
    use uom::si::frequency::megahertz;
    use uom::si::length::{micrometer, nanometer};
    use uom::si::power::milliwatt;
    use uom::si::time::millisecond;
    use uom::si::volume_rate::cubic_meter_per_second;

    #[derive(Default)]
    struct TestObserver {
        sampled: Vec<String>,
        skipped: Vec<String>,
        signals: usize,
        segments: Vec<Segment>,
    }

    impl Observer for TestObserver {
        fn on_population_sampled(&mut self, events: &PopulationEvents) {
            self.sampled.push(events.name.clone());
        }

        fn on_population_skipped(&mut self, population: &Population, _: f64) {
            self.skipped.push(population.name.clone());
        }

        fn on_signal_generated(&mut self, _: &SignalGenerator) {
            self.signals += 1;
        }

        fn on_segment(&mut self, segment: &Segment) {
            self.segments.push(*segment);
        }
    }

    fn flow_cell() -> FlowCell {
        FlowCell::builder()
            .width(Length::new::<micrometer>(100.0))
            .height(Length::new::<micrometer>(100.0))
            .sample_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-11))
            .sheath_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-10))
            .build()
            .unwrap()
    }

    fn beam() -> GaussianBeam {
        GaussianBeam::builder()
            .wavelength(Length::new::<nanometer>(488.0))
            .optical_power(Power::new::<milliwatt>(20.0))
            .waist(Length::new::<micrometer>(2.0))
            .build()
            .unwrap()
    }

    fn detector(name: &str, power_mw: f64) -> Detector {
        Detector::builder()
            .name(name)
            .coupling(UniformCoupling::new(Power::new::<milliwatt>(power_mw)))
            .build()
    }

    fn amplifier() -> TransimpedanceAmplifier {
        TransimpedanceAmplifier::builder()
            .gain(ElectricalResistance::new::<ohm>(100.0))
            .bandwidth(Frequency::new::<megahertz>(10.0))
            .build()
    }

    fn digitizer() -> Digitizer {
        Digitizer::builder()
            .sampling_rate(Frequency::new::<megahertz>(1.0))
            .bit_depth(BitDepth::from_bits(12))
            .build()
    }

    fn population(name: &str, count: ParticleCount, sampling_method: SamplingMethod) -> Population {
        Population::builder()
            .name(name)
            .diameter(Distribution::Delta(1e-7))
            .refractive_index(Distribution::Delta(1.45))
            .particle_count(count)
            .sampling_method(sampling_method)
            .build()
    }

    #[test]
    fn builder_validation() {
        let missing = FlowCytometer::builder()
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .observer(())
            .build();
        assert!(missing.is_err());

        let duplicated = FlowCytometer::builder()
            .add_detector(detector("fsc", 1.0))
            .add_detector(detector("fsc", 2.0))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .observer(())
            .build();
        assert!(duplicated.is_err());

        let unknown_trigger = FlowCytometer::builder()
            .add_detector(detector("fsc", 1.0))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .triggering_system(
                TriggeringSystem::builder()
                    .trigger_detector("ssc")
                    .threshold(Threshold::Absolute(0.1))
                    .build(),
            )
            .observer(())
            .build();
        assert!(matches!(unknown_trigger, Err(Error::UnknownChannel(_))));
    }

    #[test]
    fn empty_population_contributes_nothing() {
        let mut cytometer = FlowCytometer::builder()
            .add_population(population("none", ParticleCount::Concentration(0.0), SamplingMethod::Explicit))
            .add_population(population("none either", ParticleCount::Number(0.0), SamplingMethod::gamma()))
            .add_detector(detector("fsc", 1.0))
            .add_detector(detector("ssc", 0.5))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .background_power(Power::new::<milliwatt>(1.0))
            .settings(SimulationSettings::noiseless())
            .observer(TestObserver::default())
            .build()
            .unwrap();

        let acquisition = cytometer
            .run(Time::new::<millisecond>(1.0), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(acquisition.events.is_empty());
        assert_eq!(acquisition.analog.len(), 1000);
        // 1 mW background, 1 A/W, 100 V/A.
        for channel in ["fsc", "ssc"] {
            let signal = acquisition.analog.get_signal(channel).unwrap();
            assert!(signal.iter().all(|&v| (v - 0.1).abs() < 1e-12));
        }
        assert!(acquisition.triggered.is_none());
        assert!(acquisition.peaks.is_none());

        let observer = cytometer.into_observer();
        assert_eq!(observer.skipped, vec!["none", "none either"]);
        assert!(observer.sampled.is_empty());
        assert_eq!(observer.signals, 1);
    }

    #[test]
    fn gamma_channels_share_one_draw() {
        let mut cytometer = FlowCytometer::builder()
            .add_population(population("dense", ParticleCount::Number(1e5), SamplingMethod::gamma()))
            .add_detector(detector("fsc", 2.0))
            .add_detector(detector("ssc", 0.5))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .settings(SimulationSettings::noiseless())
            .observer(TestObserver::default())
            .build()
            .unwrap();

        let acquisition = cytometer
            .run(Time::new::<millisecond>(1.0), &mut StdRng::seed_from_u64(1))
            .unwrap();
        let aggregate = acquisition.events.get("dense").unwrap().aggregate.as_ref().unwrap();
        assert!((aggregate.expected_per_bin - 100.0).abs() < 1e-9);

        let fsc = acquisition.analog.get_signal("fsc").unwrap();
        let ssc = acquisition.analog.get_signal("ssc").unwrap();
        let mut compared = 0;
        for (&a, &b) in fsc.iter().zip(ssc) {
            if a != 0.0 && b != 0.0 {
                assert!((b / a - 0.25).abs() < 1e-9);
                compared += 1;
            }
        }
        assert!(compared > 900);
        assert_eq!(cytometer.observer().sampled, vec!["dense"]);
    }

    #[test]
    fn gamma_reference_skips_dark_detectors() {
        let mut cytometer = FlowCytometer::builder()
            .add_population(population("dense", ParticleCount::Number(1e5), SamplingMethod::gamma()))
            .add_detector(detector("dark", 0.0))
            .add_detector(detector("ssc", 0.5))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .settings(SimulationSettings::noiseless())
            .observer(())
            .build()
            .unwrap();

        let acquisition = cytometer
            .run(Time::new::<millisecond>(1.0), &mut StdRng::seed_from_u64(2))
            .unwrap();
        let aggregate = acquisition.events.get("dense").unwrap().aggregate.as_ref().unwrap();
        assert_eq!(aggregate.channels[0].bin_amplitude, BinAmplitude::Degenerate);

        let dark = acquisition.analog.get_signal("dark").unwrap();
        let ssc = acquisition.analog.get_signal("ssc").unwrap();
        assert!(dark.iter().all(|&v| v == 0.0));
        assert!(ssc.iter().filter(|&&v| v > 0.0).count() > 900);
    }

    #[test]
    fn end_to_end() {
        let mut cytometer = FlowCytometer::builder()
            .add_population(population("beads", ParticleCount::Number(5.0), SamplingMethod::Explicit))
            .add_detector(detector("fsc", 1.0))
            .add_detector(detector("ssc", 0.2))
            .flow_cell(flow_cell())
            .beam(beam())
            .amplifier(amplifier())
            .digitizer(digitizer())
            .settings(SimulationSettings::noiseless())
            .triggering_system(
                TriggeringSystem::builder()
                    .trigger_detector("fsc")
                    .threshold(Threshold::Absolute(0.05))
                    .pre_buffer(20)
                    .post_buffer(20)
                    .build(),
            )
            .peak_locator(Box::new(GlobalPeakLocator::builder().build()))
            .observer(TestObserver::default())
            .build()
            .unwrap();

        let acquisition = cytometer
            .run(Time::new::<millisecond>(10.0), &mut StdRng::seed_from_u64(2))
            .unwrap();

        assert_eq!(acquisition.events.explicit_event_count(), 5);
        assert_eq!(acquisition.digital.len(), 10_000);
        assert_eq!(acquisition.capture.len(), 2);
        let digital = acquisition.digital.get_signal("fsc").unwrap();
        assert!(digital.iter().all(|&x| (0.0..4096.0).contains(&x)));

        let triggered = acquisition.triggered.as_ref().unwrap();
        assert!(!triggered.is_empty());
        assert_eq!(cytometer.observer().segments.len(), triggered.len());

        let peaks = acquisition.peaks.as_ref().unwrap();
        assert_eq!(peaks.len(), 2 * triggered.len());
        // Full-scale digitizer range: every fsc segment peaks near the top.
        assert!(peaks.detector("fsc").any(|p| p.height > 3000.0));
    }
}
