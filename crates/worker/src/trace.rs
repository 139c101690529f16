//! A small CPU path tracer over spheres.
//!
//! One pass traces one jittered ray per pixel. Surfaces are Lambertian;
//! emissive spheres end the path. Output is the running average, gamma
//! corrected with 1/2.2.

use glam::DVec3;
use lightsim_common::{PixelBuffer, RenderSettings, SceneObject};
use lightsim_render::RenderRequest;

use crate::session::Sampler;

/// Images larger than this are refused.
const MAX_PIXELS: u64 = 64 * 1024 * 1024;
const EPSILON: f64 = 1e-6;
const GAMMA: f64 = 1.0 / 2.2;

/// Deterministic path tracer. Two samplers with the same seed produce identical images.
pub struct TraceSampler {
    seed: u64,
    rng: SplitMix64,
    scene: Option<Prepared>,
    accum: Vec<DVec3>,
    passes: u32,
}

impl TraceSampler {
    pub fn new() -> Self {
        Self::with_seed(0x5eed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: SplitMix64(seed),
            scene: None,
            accum: Vec::new(),
            passes: 0,
        }
    }
}

impl Default for TraceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for TraceSampler {
    fn prepare(&mut self, request: &RenderRequest) -> Result<(), String> {
        let settings = &request.settings;
        if settings.pixel_count() > MAX_PIXELS {
            return Err(format!(
                "image of {}x{} exceeds {MAX_PIXELS} pixels",
                settings.width, settings.height
            ));
        }
        let camera = Camera::new(settings).ok_or("camera has no viewing direction")?;
        self.scene = Some(Prepared {
            spheres: request.objects.iter().map(Sphere::from).collect(),
            camera,
            width: settings.width,
            height: settings.height,
            max_bounces: settings.max_bounce_count.max(1),
        });
        self.accum = vec![DVec3::ZERO; settings.pixel_count() as usize];
        self.passes = 0;
        self.rng = SplitMix64(self.seed);
        Ok(())
    }

    fn sample(&mut self) -> PixelBuffer {
        let Some(scene) = &self.scene else {
            return PixelBuffer::new(0, 0);
        };
        let (width, height) = (scene.width, scene.height);
        for y in 0..height {
            for x in 0..width {
                let sx = 1.0 - (x as f64 + self.rng.next_f64()) / width as f64 * 2.0;
                let sy = 1.0 - (y as f64 + self.rng.next_f64()) / height as f64 * 2.0;
                let ray = scene.camera.ray(sx, sy);
                let light = scene.trace(ray, &mut self.rng);
                self.accum[(y * width + x) as usize] += light;
            }
        }
        self.passes += 1;

        let mut image = PixelBuffer::new(width, height);
        let scale = 1.0 / self.passes as f64;
        for y in 0..height {
            for x in 0..width {
                let c = self.accum[(y * width + x) as usize] * scale;
                image.set_pixel(x, y, [to_byte(c.x), to_byte(c.y), to_byte(c.z), 255]);
            }
        }
        image
    }
}

fn to_byte(linear: f64) -> u8 {
    (linear.max(0.0).powf(GAMMA).min(1.0) * 255.0) as u8
}

struct Prepared {
    spheres: Vec<Sphere>,
    camera: Camera,
    width: u32,
    height: u32,
    max_bounces: u32,
}

impl Prepared {
    fn closest_hit(&self, ray: &Ray) -> Option<(f64, &Sphere)> {
        self.spheres
            .iter()
            .filter_map(|s| s.intersect(ray).map(|t| (t, s)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    fn trace(&self, mut ray: Ray, rng: &mut SplitMix64) -> DVec3 {
        let mut throughput = DVec3::ONE;
        let mut light = DVec3::ZERO;
        for _ in 0..self.max_bounces {
            let Some((t, sphere)) = self.closest_hit(&ray) else {
                break;
            };
            light += sphere.emission * throughput;
            if sphere.emission != DVec3::ZERO {
                break;
            }
            throughput *= sphere.albedo;
            let point = ray.at(t);
            let normal = (point - sphere.center) / sphere.radius;
            let bounce = (normal + rng.unit_vector()).try_normalize().unwrap_or(normal);
            ray = Ray {
                origin: point + normal * EPSILON,
                direction: bounce,
            };
        }
        light
    }
}

struct Sphere {
    center: DVec3,
    radius: f64,
    albedo: DVec3,
    emission: DVec3,
}

impl From<&SceneObject> for Sphere {
    fn from(object: &SceneObject) -> Self {
        let color = object.color.to_unit();
        Self {
            center: object.position().into(),
            radius: object.radius,
            albedo: color,
            emission: color * object.emission,
        }
    }
}

impl Sphere {
    /// Nearest positive ray parameter where the ray meets the sphere.
    fn intersect(&self, ray: &Ray) -> Option<f64> {
        let oc = ray.origin - self.center;
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        [-b - root, -b + root].into_iter().find(|&t| t > EPSILON)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ray {
    origin: DVec3,
    /// Unit length.
    direction: DVec3,
}

impl Ray {
    fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// Pinhole camera with a projection screen one unit in front of it.
struct Camera {
    position: DVec3,
    screen_center: DVec3,
    u: DVec3,
    v: DVec3,
}

impl Camera {
    fn new(settings: &RenderSettings) -> Option<Self> {
        let position: DVec3 = settings.camera_position.into();
        let target: DVec3 = settings.looking_at.into();
        let forward = (target - position).try_normalize()?;
        let u = forward
            .cross(DVec3::Y)
            .try_normalize()
            .or_else(|| forward.cross(DVec3::Z).try_normalize())?;
        let v = u.cross(forward);
        let aspect = settings.width as f64 / settings.height.max(1) as f64;
        Some(Self {
            position,
            screen_center: position + forward,
            u,
            v: v / aspect,
        })
    }

    /// Ray through screen coordinates in [-1, 1].
    fn ray(&self, sx: f64, sy: f64) -> Ray {
        let on_screen = self.screen_center + self.u * sx + self.v * sy;
        Ray {
            origin: self.position,
            direction: (on_screen - self.position).normalize(),
        }
    }
}

/// Splitmix64 PRNG.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform on the unit sphere, by rejection from the enclosing cube.
    fn unit_vector(&mut self) -> DVec3 {
        loop {
            let p = DVec3::new(self.next_f64(), self.next_f64(), self.next_f64()) * 2.0 - 1.0;
            let len2 = p.length_squared();
            if len2 > 1e-12 && len2 <= 1.0 {
                return p / len2.sqrt();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightsim_common::{Color, Position};

    fn request(objects: Vec<SceneObject>) -> RenderRequest {
        RenderRequest::new(
            objects,
            RenderSettings {
                width: 8,
                height: 8,
                samples_per_pixel: 2,
                ..RenderSettings::default()
            },
        )
    }

    fn render(sampler: &mut TraceSampler, req: &RenderRequest, passes: u32) -> PixelBuffer {
        sampler.prepare(req).unwrap();
        let mut image = PixelBuffer::new(0, 0);
        for _ in 0..passes {
            image = sampler.sample();
        }
        image
    }

    #[test]
    fn empty_scene_is_black_and_opaque() {
        let image = render(&mut TraceSampler::new(), &request(vec![]), 1);
        assert_eq!(image.width(), 8);
        assert!(image.as_bytes().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn emissive_sphere_in_view_is_lit() {
        let light = SceneObject {
            radius: 10.0,
            color: Color::WHITE,
            emission: 1.0,
            ..SceneObject::default()
        };
        let image = render(&mut TraceSampler::new(), &request(vec![light]), 1);
        assert_eq!(image.pixel(4, 4), Some([255, 255, 255, 255]));
    }

    #[test]
    fn diffuse_sphere_alone_stays_dark() {
        let ball = SceneObject {
            radius: 10.0,
            color: Color::WHITE,
            ..SceneObject::default()
        };
        let image = render(&mut TraceSampler::new(), &request(vec![ball]), 2);
        assert_eq!(image.pixel(4, 4), Some([0, 0, 0, 255]));
    }

    #[test]
    fn same_seed_same_image() {
        let mut objects = vec![SceneObject {
            radius: 6.0,
            color: Color::new(200, 120, 40),
            ..SceneObject::default()
        }];
        objects.push(SceneObject {
            y: 12.0,
            radius: 4.0,
            color: Color::WHITE,
            emission: 2.0,
            ..SceneObject::default()
        });
        let req = request(objects);
        let a = render(&mut TraceSampler::new(), &req, 3);
        let b = render(&mut TraceSampler::new(), &req, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn prepare_resets_accumulation() {
        let mut sampler = TraceSampler::new();
        let req = request(vec![]);
        render(&mut sampler, &req, 3);
        sampler.prepare(&req).unwrap();
        assert_eq!(sampler.passes, 0);
    }

    #[test]
    fn oversized_image_is_refused() {
        let mut req = request(vec![]);
        req.settings.width = 100_000;
        req.settings.height = 100_000;
        assert!(TraceSampler::new().prepare(&req).is_err());
    }

    #[test]
    fn camera_looking_straight_up_still_has_a_frame() {
        let settings = RenderSettings {
            camera_position: Position::new(0.0, -10.0, 0.0),
            looking_at: Position::ORIGIN,
            ..RenderSettings::default()
        };
        assert!(Camera::new(&settings).is_some());
    }

    #[test]
    fn sphere_hit_from_outside_and_inside() {
        let sphere = Sphere::from(&SceneObject {
            z: 5.0,
            ..SceneObject::default()
        });
        let outside = Ray {
            origin: DVec3::ZERO,
            direction: DVec3::Z,
        };
        assert!((sphere.intersect(&outside).unwrap() - 4.0).abs() < 1e-9);
        let inside = Ray {
            origin: DVec3::new(0.0, 0.0, 5.0),
            direction: DVec3::Z,
        };
        assert!((sphere.intersect(&inside).unwrap() - 1.0).abs() < 1e-9);
        let miss = Ray {
            origin: DVec3::ZERO,
            direction: DVec3::X,
        };
        assert!(sphere.intersect(&miss).is_none());
    }
}
