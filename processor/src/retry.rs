use std::{
    fmt::{Debug, Display},
    future::Future,
    time::Duration,
};

use common::{PollPolicy, RetryPolicy};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Resultado de una operación reintentada y cuántos intentos consumió.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Ejecuta `op` hasta que salga bien o se acaben los intentos de `policy`.
/// `op` recibe el número de intento (desde 1).
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "{} falló (intento {}/{}): {}, reintentando",
                    label, attempt, max_attempts, e
                );
                if !policy.delay.is_zero() {
                    sleep(policy.delay).await;
                }
            }
            Err(e) => {
                warn!("{} falló tras {} intentos: {}", label, attempt, e);
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Resultado de un polling acotado por tiempo.
#[derive(Debug)]
pub struct Polled<T> {
    /// Último valor leído bien, terminal o no
    pub last: Option<T>,
    /// true si `last` cumplió `is_done` antes del límite
    pub finished: bool,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Llama a `op` cada `policy.interval` hasta que un valor cumpla `is_done` o
/// se agote `policy.max_wait`. `op` recibe el tiempo que queda (para acotar
/// su propio timeout). Los errores se loguean y se sigue esperando. Siempre
/// hay al menos una llamada.
pub async fn poll_until<T, E, F, Fut, P>(
    policy: &PollPolicy,
    label: &str,
    mut op: F,
    is_done: P,
) -> Polled<T>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    T: Debug,
    E: Display,
{
    let started = Instant::now();
    let deadline = started + policy.max_wait;
    let mut attempts = 0;
    let mut last = None;

    loop {
        attempts += 1;

        match op(deadline.saturating_duration_since(Instant::now())).await {
            Ok(value) if is_done(&value) => {
                return Polled {
                    last: Some(value),
                    finished: true,
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            Ok(value) => {
                debug!(
                    "{}: {:?} (consulta {}, {}s)",
                    label,
                    value,
                    attempts,
                    started.elapsed().as_secs()
                );
                last = Some(value);
            }
            Err(e) => warn!("{} falló (consulta {}): {}, sigo esperando", label, attempts, e),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(policy.interval.min(deadline - now)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    warn!(
        "{} sin terminar tras {:?} ({} consultas)",
        label, policy.max_wait, attempts
    );
    Polled {
        last,
        finished: false,
        attempts,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn agota_exactamente_los_intentos() {
        let calls = AtomicU32::new(0);
        let out: Attempted<(), &str> = retry_async(&RetryPolicy::immediate(3), "prueba", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("siempre falla") }
        })
        .await;

        assert!(out.result.is_err());
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fallo_transitorio_y_despues_exito() {
        let out = retry_async(&RetryPolicy::immediate(3), "prueba", |attempt| async move {
            if attempt == 1 {
                Err("timeout")
            } else {
                Ok(attempt * 10)
            }
        })
        .await;

        assert_eq!(out.result.unwrap(), 20);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn cero_intentos_se_trata_como_uno() {
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(1),
        };
        let out: Attempted<u32, String> =
            retry_async(&policy, "prueba", |_| async { Err("no".to_string()) }).await;
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn respeta_la_pausa_entre_intentos() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(20),
        };
        let started = std::time::Instant::now();
        let out: Attempted<(), &str> =
            retry_async(&policy, "prueba", |_| async { Err("no") }).await;

        assert_eq!(out.attempts, 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    fn quick_poll(max_wait_ms: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }

    #[tokio::test]
    async fn polling_termina_en_cuanto_hay_valor_final() {
        let out: Polled<u32> = poll_until(
            &quick_poll(500),
            "prueba",
            |_| async { Ok::<_, &str>(7) },
            |v| *v == 7,
        )
        .await;

        assert!(out.finished);
        assert_eq!(out.last, Some(7));
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn polling_ignora_errores_y_sigue() {
        let out = poll_until(
            &quick_poll(500),
            "prueba",
            {
                let mut n = 0;
                move |_| {
                    n += 1;
                    let current = n;
                    async move {
                        match current {
                            1 => Err("caído"),
                            2 => Ok("running"),
                            _ => Ok("success"),
                        }
                    }
                }
            },
            |s| *s == "success",
        )
        .await;

        assert!(out.finished);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn polling_sin_final_agota_el_plazo() {
        let started = std::time::Instant::now();
        let out = poll_until(
            &quick_poll(60),
            "prueba",
            |_| async { Ok::<_, &str>("pending") },
            |s| *s == "success",
        )
        .await;

        assert!(!out.finished);
        assert_eq!(out.last, Some("pending"));
        assert!(out.attempts >= 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn plazo_cero_igual_consulta_una_vez() {
        let out = poll_until(
            &quick_poll(0),
            "prueba",
            |remaining| async move {
                assert!(remaining.is_zero());
                Ok::<_, &str>(1u8)
            },
            |_| false,
        )
        .await;

        assert!(!out.finished);
        assert_eq!(out.attempts, 1);
    }
}
