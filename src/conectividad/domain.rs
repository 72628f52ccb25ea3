use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};


pub enum TimerEvent {
    /// El temporizador de vigilancia (Watchdog) expiró.
    Timeout,
    /// Comando interno para iniciar el temporizador.
    InitTimer(Duration),
}


/// Temporizador de un disparo por ciclo: cada `InitTimer` arma una espera
/// y al vencer responde `Timeout`. El sondeo rearma el siguiente ciclo.
pub async fn watchdog_timer_for_sondeo(tx_to_sondeo: mpsc::Sender<TimerEvent>,
                                       mut cmd_rx: mpsc::Receiver<TimerEvent>) {
    loop {
        let duration = match cmd_rx.recv().await {
            Some(TimerEvent::InitTimer(d)) => d,
            None => break, // Canal cerrado, terminar tarea
            _ => continue,
        };

        sleep(duration).await;
        if tx_to_sondeo.send(TimerEvent::Timeout).await.is_err() {
            break;
        }
    }
}


pub fn start_watchdog(tx_to_sondeo: mpsc::Sender<TimerEvent>,
                      rx_from_sondeo: mpsc::Receiver<TimerEvent>) {

    tokio::spawn(async move {
        watchdog_timer_for_sondeo(
            tx_to_sondeo,
            rx_from_sondeo
        ).await;
    });
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn el_watchdog_devuelve_timeout() {
        let (tx_timer, rx_cmd) = mpsc::channel(4);
        let (tx_sondeo, mut rx_sondeo) = mpsc::channel(4);
        start_watchdog(tx_sondeo, rx_cmd);

        tx_timer.send(TimerEvent::InitTimer(Duration::from_millis(10))).await.unwrap();

        match rx_sondeo.recv().await {
            Some(TimerEvent::Timeout) => {}
            _ => panic!("se esperaba Timeout"),
        }
    }
}
